mod support;

use reseller_payment_server::{
    error::AppError,
    models::{
        money::Money,
        order::OrderStatus,
        payment::{PaymentPurpose, PaymentStatus, PaymentType, ResellerRegistrationRequest},
        user::{AccountStatus, Role},
    },
    services::{callback_service::handle_callback, payment_service},
};
use support::{Harness, principal, seed_order, seed_reseller, seed_user, settings};

fn registration(email: &str, business_name: &str) -> ResellerRegistrationRequest {
    ResellerRegistrationRequest {
        email: email.to_string(),
        password: "correct horse battery staple".to_string(),
        name: "Rahim".to_string(),
        business_name: business_name.to_string(),
        domain: None,
    }
}

#[tokio::test]
async fn wallet_topup_opens_pending_payment() {
    let h = Harness::new();
    let reseller = seed_reseller(&h.db, "shop@example.com", 0).await;

    let initiated = payment_service::initiate_wallet_topup(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &principal(&reseller),
        Money::from_minor(50_000),
    )
    .await
    .unwrap();

    assert!(initiated.redirect_url.ends_with(&initiated.payment_id));
    let record = h.db.payment(&initiated.payment_id).await.unwrap();
    assert_eq!(record.status, PaymentStatus::Pending);
    assert_eq!(record.amount, Money::from_minor(50_000));
    assert_eq!(
        record.purpose,
        PaymentPurpose::WalletTopup {
            reseller_id: reseller.id
        }
    );

    let sent = h.gateway.initialized();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payment_type, PaymentType::WalletTopup);
    assert!(sent[0].reference.starts_with("TOPUP-"));
}

#[tokio::test]
async fn wallet_topup_validates_before_reaching_gateway() {
    let h = Harness::new();
    let reseller = seed_reseller(&h.db, "shop@example.com", 0).await;
    let customer = seed_user(&h.db, "buyer@example.com", Role::Customer, AccountStatus::Active).await;

    let err = payment_service::initiate_wallet_topup(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &principal(&reseller),
        Money::ZERO,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = payment_service::initiate_wallet_topup(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &principal(&customer),
        Money::from_minor(100),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    assert!(h.gateway.initialized().is_empty());
}

#[tokio::test]
async fn registration_stores_only_a_password_hash() {
    let h = Harness::new();

    let initiated = payment_service::initiate_reseller_registration(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &settings(),
        registration(" New@Example.com ", "Gamer Zone"),
    )
    .await
    .unwrap();

    let record = h.db.payment(&initiated.payment_id).await.unwrap();
    assert_eq!(record.amount, Money::from_minor(100_000));
    let PaymentPurpose::ResellerRegistration(pending) = record.purpose else {
        panic!("expected a registration payload");
    };
    assert_eq!(pending.email, "new@example.com");
    assert!(pending.password_hash.starts_with("$argon2"));
    assert!(!pending.password_hash.contains("correct horse"));

    // No account exists until the fee is settled
    assert_eq!(h.db.users_with_email("new@example.com").await, 0);
}

#[tokio::test]
async fn registration_rejects_known_email_and_bad_input() {
    let h = Harness::new();
    seed_user(&h.db, "taken@example.com", Role::Customer, AccountStatus::Active).await;

    let err = payment_service::initiate_reseller_registration(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &settings(),
        registration("taken@example.com", "Gamer Zone"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = payment_service::initiate_reseller_registration(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &settings(),
        registration("x@example.com", "!!!"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut missing = registration("y@example.com", "Shop");
    missing.password.clear();
    let err = payment_service::initiate_reseller_registration(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &settings(),
        missing,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut bad_domain = registration("z@example.com", "Shop");
    bad_domain.domain = Some("https://shop.example.com".to_string());
    let err = payment_service::initiate_reseller_registration(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &settings(),
        bad_domain,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert!(h.gateway.initialized().is_empty());
}

#[tokio::test]
async fn order_payment_covers_the_order_total() {
    let h = Harness::new();
    let customer = seed_user(&h.db, "buyer@example.com", Role::Customer, AccountStatus::Active).await;
    let order = seed_order(&h.db, None, Some(customer.id), 80, 100, OrderStatus::Pending).await;

    let initiated = payment_service::initiate_order_payment(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &principal(&customer),
        order.id,
    )
    .await
    .unwrap();

    let record = h.db.payment(&initiated.payment_id).await.unwrap();
    assert_eq!(record.amount, order.total);
    assert_eq!(record.purpose, PaymentPurpose::Order { order_id: order.id });
    assert_eq!(h.gateway.initialized()[0].reference, order.order_number);

    // Settle it, then a second payment attempt is refused
    handle_callback(
        h.db.as_ref(),
        h.gateway.as_ref(),
        h.notifier.as_ref(),
        Some(initiated.payment_id.as_str()),
        Some("success"),
    )
    .await;
    let err = payment_service::initiate_order_payment(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &principal(&customer),
        order.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn order_payment_is_for_the_buyer_only() {
    let h = Harness::new();
    let buyer = seed_user(&h.db, "buyer@example.com", Role::Customer, AccountStatus::Active).await;
    let stranger = seed_user(&h.db, "other@example.com", Role::Customer, AccountStatus::Active).await;
    let order = seed_order(&h.db, None, Some(buyer.id), 80, 100, OrderStatus::Pending).await;

    let err = payment_service::initiate_order_payment(
        h.db.as_ref(),
        h.gateway.as_ref(),
        &principal(&stranger),
        order.id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
    assert!(h.gateway.initialized().is_empty());
}

//! Payment initiation and refunds.
//!
//! Initiation opens a payment at the gateway first and persists the pending
//! record only once the gateway has assigned its id. Nothing else changes
//! until the callback arrives.

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use uuid::Uuid;

use crate::{
    config::ServiceSettings,
    db::Database,
    error::AppError,
    gateway::{InitializePayment, PaymentGateway},
    models::{
        money::Money,
        order::{OrderPaymentStatus, OrderStatus},
        payment::{
            NewPayment, PaymentInitiatedResponse, PaymentPurpose, PaymentResponse, PaymentStatus,
            PendingRegistration, ResellerRegistrationRequest,
        },
        user::Principal,
    },
    services::subdomain,
};

/// Open a gateway payment and persist its pending record.
async fn open_payment(
    db: &dyn Database,
    gateway: &dyn PaymentGateway,
    amount: Money,
    description: String,
    reference: String,
    purpose: PaymentPurpose,
) -> Result<PaymentInitiatedResponse, AppError> {
    let initialized = gateway
        .initialize_payment(InitializePayment {
            payment_type: purpose.payment_type(),
            amount,
            description: description.clone(),
            reference,
        })
        .await?;

    let mut tx = db.begin().await?;
    let record = tx
        .insert_payment(&NewPayment {
            payment_id: initialized.payment_id,
            amount,
            description,
            purpose,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(
        payment_id = %record.payment_id,
        payment_type = %record.payment_type(),
        amount = %record.amount,
        "payment initiated"
    );

    Ok(PaymentInitiatedResponse {
        payment_id: record.payment_id,
        redirect_url: initialized.redirect_url,
    })
}

fn short_reference(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", id[..12].to_uppercase())
}

/// Start a wallet top-up for the calling reseller.
///
/// # Errors
///
/// - `Unauthorized`: caller is not a reseller, or is suspended
/// - `Validation`: amount is zero or negative
/// - `Gateway`: the gateway refused to open the payment
pub async fn initiate_wallet_topup(
    db: &dyn Database,
    gateway: &dyn PaymentGateway,
    principal: &Principal,
    amount: Money,
) -> Result<PaymentInitiatedResponse, AppError> {
    let reseller_id = principal.reseller_id()?;
    if !amount.is_positive() {
        return Err(AppError::Validation("Amount must be positive".to_string()));
    }

    open_payment(
        db,
        gateway,
        amount,
        "Wallet Top-up".to_string(),
        short_reference("TOPUP"),
        PaymentPurpose::WalletTopup { reseller_id },
    )
    .await
}

/// Start a paid reseller registration.
///
/// The account is only created when the fee is settled. Until then the
/// applicant's data, with the password already hashed, lives in the payment.
pub async fn initiate_reseller_registration(
    db: &dyn Database,
    gateway: &dyn PaymentGateway,
    settings: &ServiceSettings,
    request: ResellerRegistrationRequest,
) -> Result<PaymentInitiatedResponse, AppError> {
    let email = request.email.trim().to_lowercase();
    let name = request.name.trim().to_string();
    let business_name = request.business_name.trim().to_string();

    if email.is_empty() || request.password.is_empty() || name.is_empty() || business_name.is_empty()
    {
        return Err(AppError::Validation(
            "All required fields must be provided".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if subdomain::sanitize_subdomain(&business_name).is_empty() {
        return Err(AppError::Validation(
            "Business name must contain letters or digits".to_string(),
        ));
    }
    let domain = match request.domain.map(|d| d.trim().to_lowercase()) {
        Some(d) if d.is_empty() => None,
        Some(d) if !subdomain::validate_custom_domain(&d) => {
            return Err(AppError::Validation("Invalid domain format".to_string()));
        }
        other => other,
    };

    {
        let mut tx = db.begin().await?;
        if tx.fetch_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        tx.commit().await?;
    }

    let password_hash = hash_password(&request.password)?;

    open_payment(
        db,
        gateway,
        settings.registration_fee,
        "Reseller Registration Fee".to_string(),
        short_reference("REG"),
        PaymentPurpose::ResellerRegistration(PendingRegistration {
            email,
            password_hash,
            name,
            business_name,
            domain,
        }),
    )
    .await
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| AppError::Internal(format!("salt encoding failed: {e}")))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Start the payment of a customer's pending order for its full total.
pub async fn initiate_order_payment(
    db: &dyn Database,
    gateway: &dyn PaymentGateway,
    principal: &Principal,
    order_id: Uuid,
) -> Result<PaymentInitiatedResponse, AppError> {
    let order = {
        let mut tx = db.begin().await?;
        let order = tx
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
        tx.commit().await?;
        order
    };

    if order.customer_id != Some(principal.user_id()) {
        return Err(AppError::Unauthorized(
            "order belongs to another customer".to_string(),
        ));
    }
    if order.status != OrderStatus::Pending || order.payment_status != OrderPaymentStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "order {} is not awaiting payment",
            order.order_number
        )));
    }
    if !order.total.is_positive() {
        return Err(AppError::Validation("Order total must be positive".to_string()));
    }

    open_payment(
        db,
        gateway,
        order.total,
        format!("Order {}", order.order_number),
        order.order_number.clone(),
        PaymentPurpose::Order { order_id },
    )
    .await
}

/// Refund the completed payment of an order.
///
/// # Order Status
///
/// - `completed` -> `refunded`
/// - `pending` (paid, never processed by the reseller) -> `cancelled`
/// - anything else is rejected with `InvalidState`
///
/// Money goes back to the customer outside this system; reseller wallets
/// are not touched.
pub async fn refund_order_payment(
    db: &dyn Database,
    principal: &Principal,
    order_id: Uuid,
    reason: String,
) -> Result<PaymentResponse, AppError> {
    let admin_id = principal.admin_id()?;
    let reason = reason.trim().to_string();
    if reason.is_empty() {
        return Err(AppError::Validation("Refund reason is required".to_string()));
    }

    let mut tx = db.begin().await?;

    let mut order = tx
        .fetch_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
    let mut payment = tx
        .fetch_settled_order_payment(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;

    if payment.status != PaymentStatus::Completed {
        return Err(AppError::InvalidState(
            "Payment cannot be refunded".to_string(),
        ));
    }

    match order.status {
        OrderStatus::Completed => order.transition(OrderStatus::Refunded)?,
        OrderStatus::Pending => order.transition(OrderStatus::Cancelled)?,
        other => {
            return Err(AppError::InvalidState(format!(
                "order in status {other:?} cannot be refunded"
            )));
        }
    }
    order.payment_status = OrderPaymentStatus::Refunded;
    payment.refund(reason, admin_id)?;

    tx.update_payment(&payment).await?;
    tx.update_order(&order).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = %order.id,
        payment_id = %payment.payment_id,
        refunded_by = %admin_id,
        "order payment refunded"
    );

    Ok(payment.into())
}

//! Settlement handlers, one per payment type.
//!
//! A handler applies the domain effect of a confirmed payment inside the
//! callback's transaction. It either succeeds completely or returns an error
//! and leaves the caller to drop the transaction; it never commits itself.
//! Notifications are returned, not sent, so they go out after commit.

use serde_json::json;
use uuid::Uuid;

use crate::{
    db::DbTransaction,
    error::AppError,
    models::{
        order::{OrderPaymentStatus, OrderStatus},
        payment::{PaymentPurpose, PaymentRecord, PendingRegistration},
        user::{AccountStatus, NewUser, Role},
    },
    services::{
        notification_service::{Notification, NotificationKind, Outbound},
        wallet_service,
    },
};

/// Apply the effect selected by the record's purpose.
pub async fn apply(
    tx: &mut dyn DbTransaction,
    record: &PaymentRecord,
    gateway_trx_id: Option<&str>,
) -> Result<Vec<Outbound>, AppError> {
    match &record.purpose {
        PaymentPurpose::Order { order_id } => settle_order(tx, record, *order_id).await,
        PaymentPurpose::WalletTopup { reseller_id } => {
            settle_wallet_topup(tx, record, *reseller_id, gateway_trx_id).await
        }
        PaymentPurpose::ResellerRegistration(registration) => {
            settle_registration(tx, registration).await
        }
    }
}

/// Mark the order paid.
///
/// Platform orders go straight through processing to completed and are
/// queued for fulfillment. Reseller orders stay pending until the reseller
/// processes them against their wallet.
async fn settle_order(
    tx: &mut dyn DbTransaction,
    record: &PaymentRecord,
    order_id: Uuid,
) -> Result<Vec<Outbound>, AppError> {
    let mut order = tx
        .fetch_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

    if order.status != OrderStatus::Pending || order.payment_status != OrderPaymentStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "order {} is not awaiting payment",
            order.order_number
        )));
    }
    if record.amount != order.total {
        return Err(AppError::InvalidState(format!(
            "paid amount {} does not match order total {}",
            record.amount, order.total
        )));
    }

    order.payment_status = OrderPaymentStatus::Completed;
    let mut outbound = Vec::new();

    match order.reseller_id {
        None => {
            order.transition(OrderStatus::Processing)?;
            order.transition(OrderStatus::Completed)?;
            tx.enqueue_fulfillment(order.id).await?;
        }
        Some(reseller_id) => {
            order.updated_at = chrono::Utc::now();
            outbound.push(Outbound::User(Notification {
                user_id: reseller_id,
                kind: NotificationKind::Order,
                title: "New paid order".to_string(),
                message: format!("Order {} is paid and waiting to be processed", order.order_number),
                metadata: json!({ "order_id": order.id }),
            }));
        }
    }

    tx.update_order(&order).await?;

    tracing::info!(
        order_id = %order.id,
        payment_id = %record.payment_id,
        status = ?order.status,
        "order payment settled"
    );

    Ok(outbound)
}

/// Credit the reseller's wallet by the paid amount.
async fn settle_wallet_topup(
    tx: &mut dyn DbTransaction,
    record: &PaymentRecord,
    reseller_id: Uuid,
    gateway_trx_id: Option<&str>,
) -> Result<Vec<Outbound>, AppError> {
    let user = tx
        .fetch_user(reseller_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Reseller".to_string()))?;
    if user.role != Role::Reseller {
        return Err(AppError::InvalidState(
            "wallet owner is not a reseller".to_string(),
        ));
    }

    let description = match gateway_trx_id {
        Some(trx) => format!("Wallet top-up via bKash ({trx})"),
        None => "Wallet top-up via bKash".to_string(),
    };
    let entry = wallet_service::credit(
        tx,
        reseller_id,
        record.amount,
        description,
        format!("payment:{}", record.payment_id),
    )
    .await?;

    tracing::info!(
        reseller_id = %reseller_id,
        payment_id = %record.payment_id,
        amount = %entry.amount,
        "wallet credited"
    );

    Ok(vec![Outbound::User(Notification {
        user_id: reseller_id,
        kind: NotificationKind::Wallet,
        title: "Wallet credited".to_string(),
        message: format!("{} BDT was added to your wallet", entry.amount),
        metadata: json!({ "payment_id": record.payment_id, "entry_id": entry.id }),
    })])
}

/// Create the pending reseller account held by the payment.
async fn settle_registration(
    tx: &mut dyn DbTransaction,
    registration: &PendingRegistration,
) -> Result<Vec<Outbound>, AppError> {
    // The email may have been taken since the registration was initiated
    if tx.fetch_user_by_email(&registration.email).await?.is_some() {
        return Err(AppError::Conflict(
            "user with this email already exists".to_string(),
        ));
    }

    let user = tx
        .insert_user(&NewUser {
            email: registration.email.clone(),
            name: registration.name.clone(),
            password_hash: registration.password_hash.clone(),
            role: Role::Reseller,
            status: AccountStatus::Pending,
            business_name: Some(registration.business_name.clone()),
        })
        .await?;

    tracing::info!(user_id = %user.id, "reseller registered, awaiting approval");

    Ok(vec![Outbound::Admins {
        kind: NotificationKind::Registration,
        title: "New reseller registration".to_string(),
        message: format!(
            "{} ({}) registered and is awaiting approval",
            registration.business_name, registration.email
        ),
        metadata: json!({
            "user_id": user.id,
            "domain": registration.domain,
        }),
    }])
}

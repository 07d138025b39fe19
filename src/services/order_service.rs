//! Order processing: a reseller pays for a customer order from their wallet.
//!
//! # Atomicity Guarantees
//!
//! The wallet debit, its ledger entry, the order transition and the
//! fulfillment request are written in one transaction. Every precondition is
//! read inside that transaction, with the order and the reseller row locked,
//! so two concurrent calls for the same order cannot both pass the
//! `pending` check.
//!
//! Every processed order has exactly one debit entry referencing it, so an
//! order without a positive cost is rejected.

use serde_json::json;
use uuid::Uuid;

use crate::{
    db::Database,
    error::AppError,
    models::{
        order::{Order, OrderStatus},
        user::Principal,
    },
    services::{
        notification_service::{self, NotificationKind, Notifier},
        wallet_service,
    },
};

/// Process a pending order owned by the calling reseller.
///
/// # Errors
///
/// - `Unauthorized`: caller is not an active reseller, or does not own the order
/// - `NotFound`: order does not exist
/// - `InvalidState`: order is not pending, or has no positive cost
/// - `InsufficientBalance`: wallet does not cover the order cost
///
/// All errors leave the wallet and the order unchanged.
pub async fn process_order(
    db: &dyn Database,
    notifier: &dyn Notifier,
    principal: &Principal,
    order_id: Uuid,
) -> Result<Order, AppError> {
    let reseller_id = principal.active_reseller_id()?;

    let mut tx = db.begin().await?;

    let mut order = tx
        .fetch_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

    if order.reseller_id != Some(reseller_id) {
        return Err(AppError::Unauthorized(
            "order belongs to another reseller".to_string(),
        ));
    }
    if order.status != OrderStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "order {} is {:?}, expected pending",
            order.order_number, order.status
        )));
    }

    if !order.cost.is_positive() {
        return Err(AppError::InvalidState(format!(
            "order {} has no cost to pay from the wallet",
            order.order_number
        )));
    }

    let reseller = tx
        .fetch_user(reseller_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Reseller".to_string()))?;
    if reseller.wallet_balance < order.cost {
        return Err(AppError::InsufficientBalance);
    }

    wallet_service::debit(
        &mut *tx,
        reseller_id,
        order.cost,
        format!("Payment for order {}", order.order_number),
        format!("order:{}", order.id),
    )
    .await?;

    order.transition(OrderStatus::Processing)?;
    tx.update_order(&order).await?;
    tx.enqueue_fulfillment(order.id).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = %order.id,
        reseller_id = %reseller_id,
        cost = %order.cost,
        "order processed"
    );

    notification_service::notify_admins(
        db,
        notifier,
        NotificationKind::Order,
        "Order processing",
        &format!("Order {} is being processed", order.order_number),
        json!({ "order_id": order.id, "reseller_id": reseller_id }),
    )
    .await;

    Ok(order)
}

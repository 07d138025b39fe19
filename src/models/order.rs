//! Order data model.
//!
//! Orders are created by the storefront checkout. This crate only moves them
//! through their payment and processing states.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::money::Money;

/// Lifecycle of an order.
///
/// Legal edges: `pending -> processing -> completed`,
/// `pending -> {cancelled, failed}` and `completed -> refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Completed, Refunded)
        )
    }
}

/// Whether the customer's money for this order has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_payment_status", rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// Represents an order record from the database.
///
/// # Money
///
/// - `total`: what the customer paid
/// - `cost`: what the owning reseller owes the platform, drawn from the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,

    /// Buyer, if the order was placed by a signed-in customer
    pub customer_id: Option<Uuid>,

    /// Owning reseller; `None` for orders sold directly by the platform
    pub reseller_id: Option<Uuid>,

    pub cost: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Move to `next`, rejecting any edge the lifecycle does not allow.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "order {} cannot move from {:?} to {:?}",
                self.order_number, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

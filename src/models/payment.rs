//! Payment records and the callback vocabulary around them.
//!
//! This module defines:
//! - `PaymentRecord`: one attempted gateway transaction and its lifecycle
//! - `PaymentPurpose`: the strongly typed payload that selects a settlement handler
//! - `CallbackRedirect`: every place the gateway callback can send the browser
//! - Request/response types for the payment endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::money::Money;

/// What a payment pays for. Fixed when the record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Order,
    WalletTopup,
    ResellerRegistration,
}

impl PaymentType {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentType::Order => "order",
            PaymentType::WalletTopup => "wallet_topup",
            PaymentType::ResellerRegistration => "reseller_registration",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a payment record.
///
/// Legal edges: `pending -> {completed, failed, cancelled}` and
/// `completed -> refunded`. Everything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Pending, Cancelled) | (Completed, Refunded)
        )
    }
}

/// Registration data held by a payment until the fee is paid.
///
/// The reseller account does not exist before settlement; this payload is the
/// only place the applicant's data lives. The password is already hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub business_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Type-specific payload of a payment, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentPurpose {
    Order { order_id: Uuid },
    WalletTopup { reseller_id: Uuid },
    ResellerRegistration(PendingRegistration),
}

impl PaymentPurpose {
    pub fn payment_type(&self) -> PaymentType {
        match self {
            PaymentPurpose::Order { .. } => PaymentType::Order,
            PaymentPurpose::WalletTopup { .. } => PaymentType::WalletTopup,
            PaymentPurpose::ResellerRegistration(_) => PaymentType::ResellerRegistration,
        }
    }
}

/// Audit annotations. Each pair is written once and never overwritten.
///
/// `settlement_claimed_at` is the exception: it marks the callback delivery
/// that is confirming the payment with the gateway, and is replaced only once
/// it has gone stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAnnotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_by: Option<Uuid>,
}

/// One attempted gateway transaction.
///
/// # Database Table
///
/// Maps to the `payments` table. `purpose` and `annotations` are JSONB columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: Uuid,

    /// Gateway-assigned identifier, the correlation key for callbacks
    pub payment_id: String,

    pub amount: Money,
    pub description: String,
    pub purpose: PaymentPurpose,
    pub status: PaymentStatus,

    /// Gateway transaction id, set on completion
    pub gateway_trx_id: Option<String>,

    pub annotations: PaymentAnnotations,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn payment_type(&self) -> PaymentType {
        self.purpose.payment_type()
    }

    fn transition(&mut self, next: PaymentStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "payment {} cannot move from {:?} to {:?}",
                self.payment_id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self, gateway_trx_id: Option<String>) -> Result<(), AppError> {
        self.transition(PaymentStatus::Completed)?;
        self.gateway_trx_id = gateway_trx_id;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), AppError> {
        self.transition(PaymentStatus::Failed)?;
        if self.annotations.failed_at.is_none() {
            self.annotations.failed_at = Some(self.updated_at);
            self.annotations.failure_reason = Some(reason.into());
        }
        Ok(())
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), AppError> {
        self.transition(PaymentStatus::Cancelled)?;
        if self.annotations.cancelled_at.is_none() {
            self.annotations.cancelled_at = Some(self.updated_at);
            self.annotations.cancel_reason = Some(reason.into());
        }
        Ok(())
    }

    pub fn refund(&mut self, reason: impl Into<String>, refunded_by: Uuid) -> Result<(), AppError> {
        self.transition(PaymentStatus::Refunded)?;
        if self.annotations.refunded_at.is_none() {
            self.annotations.refunded_at = Some(self.updated_at);
            self.annotations.refund_reason = Some(reason.into());
            self.annotations.refunded_by = Some(refunded_by);
        }
        Ok(())
    }
}

/// A payment record about to be inserted, right after the gateway assigned its id.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_id: String,
    pub amount: Money,
    pub description: String,
    pub purpose: PaymentPurpose,
}

/// Outcome reported on the gateway's redirect back to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failure,
    Cancel,
}

impl GatewayStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(GatewayStatus::Success),
            "failure" => Some(GatewayStatus::Failure),
            "cancel" => Some(GatewayStatus::Cancel),
            _ => None,
        }
    }
}

/// Where the callback sends the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackRedirect {
    OrderSuccess { order_id: Uuid },
    WalletSuccess { payment_ref: Uuid },
    RegistrationSuccess,
    Failed(PaymentType),
    Cancelled(PaymentType),
    Error,
}

impl CallbackRedirect {
    /// The success redirect for a completed record. Replaying a callback for
    /// the same record always yields the same value.
    pub fn success_for(record: &PaymentRecord) -> Self {
        match &record.purpose {
            PaymentPurpose::Order { order_id } => CallbackRedirect::OrderSuccess {
                order_id: *order_id,
            },
            PaymentPurpose::WalletTopup { .. } => CallbackRedirect::WalletSuccess {
                payment_ref: record.id,
            },
            PaymentPurpose::ResellerRegistration(_) => CallbackRedirect::RegistrationSuccess,
        }
    }

    /// Redirect for a record that already reached a terminal state.
    pub fn for_settled(record: &PaymentRecord) -> Self {
        match record.status {
            PaymentStatus::Completed => Self::success_for(record),
            PaymentStatus::Failed => CallbackRedirect::Failed(record.payment_type()),
            PaymentStatus::Cancelled => CallbackRedirect::Cancelled(record.payment_type()),
            PaymentStatus::Pending | PaymentStatus::Refunded => CallbackRedirect::Error,
        }
    }

    pub fn path(&self) -> String {
        match self {
            CallbackRedirect::OrderSuccess { order_id } => format!("/orders/{order_id}/success"),
            CallbackRedirect::WalletSuccess { payment_ref } => {
                format!("/reseller/wallet/{payment_ref}/success")
            }
            CallbackRedirect::RegistrationSuccess => "/auth/reseller/register/success".to_string(),
            CallbackRedirect::Failed(kind) => failure_path(*kind, "failed"),
            CallbackRedirect::Cancelled(kind) => failure_path(*kind, "cancelled"),
            CallbackRedirect::Error => "/orders/error".to_string(),
        }
    }
}

fn failure_path(kind: PaymentType, outcome: &str) -> String {
    match kind {
        PaymentType::Order => format!("/orders/{outcome}"),
        PaymentType::WalletTopup => format!("/reseller/wallet?status={outcome}"),
        PaymentType::ResellerRegistration => format!("/auth/reseller/register/{outcome}"),
    }
}

/// Query string of the gateway callback: `?paymentID=...&status=...`.
///
/// Both fields are optional here so a malformed callback still ends in a
/// redirect instead of a rejection.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(rename = "paymentID")]
    pub payment_id: Option<String>,
    pub status: Option<String>,
}

/// Request body for `POST /api/v1/reseller/wallet/topup`.
#[derive(Debug, Deserialize)]
pub struct WalletTopupRequest {
    pub amount: Money,
}

/// Request body for `POST /api/v1/resellers/register`.
#[derive(Debug, Deserialize)]
pub struct ResellerRegistrationRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub business_name: String,
    pub domain: Option<String>,
}

/// Returned when a payment has been opened at the gateway.
#[derive(Debug, Serialize)]
pub struct PaymentInitiatedResponse {
    pub payment_id: String,
    pub redirect_url: String,
}

/// Request body for `POST /api/v1/admin/refunds`.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub order_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: String,
    pub payment_type: PaymentType,
    pub amount: Money,
    pub status: PaymentStatus,
    pub annotations: PaymentAnnotations,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            payment_type: record.payment_type(),
            payment_id: record.payment_id,
            amount: record.amount,
            status: record.status,
            annotations: record.annotations,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(purpose: PaymentPurpose) -> PaymentRecord {
        let now = Utc::now();
        PaymentRecord {
            id: Uuid::new_v4(),
            payment_id: "PAY1".to_string(),
            amount: Money::from_minor(500),
            description: "test".to_string(),
            purpose,
            status: PaymentStatus::Pending,
            gateway_trx_id: None,
            annotations: PaymentAnnotations::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_documented_status_edges_are_legal() {
        use PaymentStatus::*;
        let all = [Pending, Completed, Failed, Cancelled, Refunded];
        let legal = [
            (Pending, Completed),
            (Pending, Failed),
            (Pending, Cancelled),
            (Completed, Refunded),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn failure_annotations_are_write_once() {
        let mut payment = record(PaymentPurpose::WalletTopup {
            reseller_id: Uuid::new_v4(),
        });
        payment.fail("gateway declined").unwrap();
        let first = payment.annotations.clone();

        // A second failure is an illegal transition and leaves the record alone.
        assert!(payment.fail("other reason").is_err());
        assert_eq!(payment.annotations, first);
        assert_eq!(payment.annotations.failure_reason.as_deref(), Some("gateway declined"));
    }

    #[test]
    fn purpose_is_tagged_by_type() {
        let purpose = PaymentPurpose::WalletTopup {
            reseller_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&purpose).unwrap();
        assert_eq!(json["type"], "wallet_topup");

        let registration: PaymentPurpose = serde_json::from_value(serde_json::json!({
            "type": "reseller_registration",
            "email": "a@b.com",
            "password_hash": "$argon2id$...",
            "name": "A",
            "business_name": "Foo"
        }))
        .unwrap();
        assert_eq!(registration.payment_type(), PaymentType::ResellerRegistration);
    }

    #[test]
    fn redirect_paths() {
        let order_id = Uuid::new_v4();
        let order = record(PaymentPurpose::Order { order_id });
        assert_eq!(
            CallbackRedirect::success_for(&order).path(),
            format!("/orders/{order_id}/success")
        );

        let topup = record(PaymentPurpose::WalletTopup {
            reseller_id: Uuid::new_v4(),
        });
        assert_eq!(
            CallbackRedirect::success_for(&topup).path(),
            format!("/reseller/wallet/{}/success", topup.id)
        );

        assert_eq!(
            CallbackRedirect::Cancelled(PaymentType::WalletTopup).path(),
            "/reseller/wallet?status=cancelled"
        );
        assert_eq!(
            CallbackRedirect::Failed(PaymentType::ResellerRegistration).path(),
            "/auth/reseller/register/failed"
        );
        assert_eq!(CallbackRedirect::Failed(PaymentType::Order).path(), "/orders/failed");
        assert_eq!(CallbackRedirect::Error.path(), "/orders/error");
    }

    #[test]
    fn gateway_status_parsing() {
        assert_eq!(GatewayStatus::parse("success"), Some(GatewayStatus::Success));
        assert_eq!(GatewayStatus::parse("cancel"), Some(GatewayStatus::Cancel));
        assert_eq!(GatewayStatus::parse("SUCCESS"), None);
        assert_eq!(GatewayStatus::parse(""), None);
    }
}

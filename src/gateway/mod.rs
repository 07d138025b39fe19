//! Payment gateway adapter.
//!
//! The adapter is pure request/response: it opens payments and confirms them
//! server-side. It holds no business rules; the callback service decides what
//! a confirmed payment means.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{money::Money, payment::PaymentType};

pub mod bkash;

/// Gateway status code for an accepted request.
pub const STATUS_CODE_SUCCESS: &str = "0000";
/// Gateway transaction status of a captured payment.
pub const TRANSACTION_COMPLETED: &str = "Completed";

/// A payment to open at the gateway.
#[derive(Debug, Clone)]
pub struct InitializePayment {
    pub payment_type: PaymentType,
    pub amount: Money,
    pub description: String,
    /// Our own reference, echoed back by the gateway as merchant invoice number
    pub reference: String,
}

/// Result of opening a payment: where to send the payer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedPayment {
    pub payment_id: String,
    pub redirect_url: String,
}

/// The gateway's answer to executing or querying a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status_code: String,
    pub transaction_status: String,
    pub trx_id: Option<String>,
    pub status_message: Option<String>,
}

impl ExecutionResult {
    /// Success is both an accepted request and a completed transaction.
    pub fn is_completed(&self) -> bool {
        self.status_code == STATUS_CODE_SUCCESS && self.transaction_status == TRANSACTION_COMPLETED
    }

    /// Human-readable reason for a non-completed execution.
    pub fn failure_reason(&self) -> String {
        match &self.status_message {
            Some(message) => format!(
                "gateway returned {} / {}: {}",
                self.status_code, self.transaction_status, message
            ),
            None => format!(
                "gateway returned {} / {}",
                self.status_code, self.transaction_status
            ),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initialize_payment(
        &self,
        request: InitializePayment,
    ) -> Result<InitializedPayment, AppError>;

    /// Confirm a payment server-side. This, not the browser redirect, is the
    /// authoritative answer on whether money moved.
    async fn execute_payment(&self, payment_id: &str) -> Result<ExecutionResult, AppError>;

    /// Current state of a payment, without executing it.
    async fn query_payment(&self, payment_id: &str) -> Result<ExecutionResult, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: &str, status: &str) -> ExecutionResult {
        ExecutionResult {
            status_code: code.to_string(),
            transaction_status: status.to_string(),
            trx_id: Some("TRX1".to_string()),
            status_message: None,
        }
    }

    #[test]
    fn completion_needs_both_code_and_status() {
        assert!(result("0000", "Completed").is_completed());
        assert!(!result("0000", "Initiated").is_completed());
        assert!(!result("2023", "Completed").is_completed());
    }

    #[test]
    fn failure_reason_mentions_gateway_answer() {
        let mut r = result("2023", "Failed");
        r.status_message = Some("Insufficient Balance".to_string());
        assert_eq!(
            r.failure_reason(),
            "gateway returned 2023 / Failed: Insufficient Balance"
        );
    }
}

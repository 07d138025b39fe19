//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//! The payment callback never renders these; it always redirects.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Lookup**: `NotFound`
/// - **Access**: `Unauthorized` (role, status or ownership mismatch)
/// - **Lifecycle**: `InvalidState`, `Conflict`
/// - **Money**: `InsufficientBalance`
/// - **Input**: `Validation`
/// - **Collaborators**: `Gateway`, `Database`
/// - **Allocation**: `AllocationExhausted`
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing payment, order, user or store.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(String),

    /// Caller lacks the role, status or ownership the operation needs.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Bearer token missing or unknown.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid or missing session token")]
    InvalidSession,

    /// Operation attempted from the wrong lifecycle state.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A uniqueness rule was violated (email, subdomain, custom domain, ledger reference).
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Wallet balance does not cover the debit.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The payment gateway reported a failure or could not be reached.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// No free subdomain within the bounded number of attempts.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Unable to allocate a unique subdomain")]
    AllocationExhausted,

    /// Unexpected internal failure (hashing, serialization).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "not_authorized",
            AppError::InvalidSession => "invalid_session",
            AppError::InvalidState(_) => "wrong_state",
            AppError::Conflict(_) => "conflict",
            AppError::InsufficientBalance => "insufficient_balance",
            AppError::Validation(_) => "validation_error",
            AppError::Gateway(_) => "gateway_error",
            AppError::AllocationExhausted => "allocation_exhausted",
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::InvalidSession => StatusCode::UNAUTHORIZED,
            AppError::InvalidState(_) | AppError::Conflict(_) | AppError::AllocationExhausted => {
                StatusCode::CONFLICT
            }
            AppError::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "insufficient_balance",
///     "message": "Insufficient balance"
///   }
/// }
/// ```
///
/// Database and internal errors hide their details from the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "An internal error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

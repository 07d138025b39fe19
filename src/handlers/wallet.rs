//! Wallet HTTP handlers.

use crate::{
    AppState,
    error::AppError,
    models::{user::Principal, wallet::WalletResponse},
    services::wallet_service,
};
use axum::{Extension, Json, extract::State};

/// Balance and ledger of the calling reseller.
///
/// # Response (200)
///
/// ```json
/// {
///   "balance": 45000,
///   "transactions": [
///     { "kind": "debit", "amount": 5000, "reference": "order:770e8400-...", "status": "completed", ... },
///     { "kind": "credit", "amount": 50000, "reference": "payment:TR0011...", "status": "completed", ... }
///   ]
/// }
/// ```
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<WalletResponse>, AppError> {
    Ok(Json(
        wallet_service::get_wallet(state.db.as_ref(), &principal).await?,
    ))
}

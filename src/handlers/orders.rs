//! Order HTTP handlers.
//!
//! - POST /api/v1/reseller/orders/{id}/process - Pay for an order from the reseller wallet

use crate::{
    AppState,
    error::AppError,
    models::{order::Order, user::Principal},
    services::order_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// Process a pending order owned by the calling reseller.
///
/// # Response
///
/// - **Success (200 OK)**: the order, now `processing`
/// - **Error (403)**: not an active reseller, or not the owner
/// - **Error (404)**: order not found
/// - **Error (409)**: order is not pending
/// - **Error (422)**: wallet balance does not cover the order cost
pub async fn process_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = order_service::process_order(
        state.db.as_ref(),
        state.notifier.as_ref(),
        &principal,
        order_id,
    )
    .await?;

    Ok(Json(order))
}

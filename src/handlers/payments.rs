//! Payment HTTP handlers.
//!
//! This module implements the payment endpoints:
//! - GET /api/v1/payments/callback - Gateway redirect target (always redirects)
//! - POST /api/v1/resellers/register - Start a paid reseller registration
//! - POST /api/v1/orders/{id}/pay - Start the payment of a customer order
//! - POST /api/v1/reseller/wallet/topup - Start a wallet top-up
//! - POST /api/v1/admin/refunds - Refund an order payment

use crate::{
    AppState,
    error::AppError,
    models::{
        payment::{
            CallbackQuery, PaymentInitiatedResponse, PaymentResponse, RefundRequest,
            ResellerRegistrationRequest, WalletTopupRequest,
        },
        user::Principal,
    },
    services::{callback_service, payment_service},
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
};
use uuid::Uuid;

/// Gateway callback.
///
/// # Endpoint
///
/// `GET /api/v1/payments/callback?paymentID=TR0011...&status=success`
///
/// # Response
///
/// Always `303 See Other`. Errors never surface as a status code here; they
/// send the browser to an error page instead.
pub async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Redirect {
    let redirect = callback_service::handle_callback(
        state.db.as_ref(),
        state.gateway.as_ref(),
        state.notifier.as_ref(),
        query.payment_id.as_deref(),
        query.status.as_deref(),
    )
    .await;

    Redirect::to(&redirect.path())
}

/// Start a reseller registration.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "owner@gamershop.bd",
///   "password": "...",
///   "name": "Rahim",
///   "business_name": "Gamer Shop",
///   "domain": "gamershop.bd"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// { "payment_id": "TR0011...", "redirect_url": "https://sandbox.payment.bkash.com/..." }
/// ```
pub async fn register_reseller(
    State(state): State<AppState>,
    Json(request): Json<ResellerRegistrationRequest>,
) -> Result<(StatusCode, Json<PaymentInitiatedResponse>), AppError> {
    let initiated = payment_service::initiate_reseller_registration(
        state.db.as_ref(),
        state.gateway.as_ref(),
        &state.settings,
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(initiated)))
}

/// Start the payment of a pending order for its total.
pub async fn pay_order(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(order_id): Path<Uuid>,
) -> Result<(StatusCode, Json<PaymentInitiatedResponse>), AppError> {
    let initiated = payment_service::initiate_order_payment(
        state.db.as_ref(),
        state.gateway.as_ref(),
        &principal,
        order_id,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(initiated)))
}

/// Start a wallet top-up.
///
/// # Request Body
///
/// ```json
/// { "amount": 50000 }
/// ```
///
/// Amount is in minor units (poisha).
pub async fn topup_wallet(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<WalletTopupRequest>,
) -> Result<(StatusCode, Json<PaymentInitiatedResponse>), AppError> {
    let initiated = payment_service::initiate_wallet_topup(
        state.db.as_ref(),
        state.gateway.as_ref(),
        &principal,
        request.amount,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(initiated)))
}

/// Refund the completed payment of an order. Admins only.
pub async fn refund(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let refunded = payment_service::refund_order_payment(
        state.db.as_ref(),
        &principal,
        request.order_id,
        request.reason,
    )
    .await?;

    Ok(Json(refunded))
}

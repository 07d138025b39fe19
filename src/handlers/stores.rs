//! Storefront HTTP handlers.
//!
//! - GET /api/v1/reseller/store - The caller's store
//! - POST /api/v1/reseller/store - Create the caller's store
//! - PATCH /api/v1/reseller/store/settings - Update pricing settings
//! - POST /api/v1/reseller/store/domain - Update subdomain / custom domain

use crate::{
    AppState,
    error::AppError,
    models::{
        store::{CreateStoreRequest, StoreSettingsPatch, Storefront, UpdateDomainRequest},
        user::Principal,
    },
    services::store_service,
};
use axum::{Extension, Json, extract::State, http::StatusCode};

pub async fn get_store(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Storefront>, AppError> {
    Ok(Json(
        store_service::get_store(state.db.as_ref(), &principal).await?,
    ))
}

/// Create the caller's store.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "My Shop!!",
///   "description": "Diamonds and UC",
///   "settings": { "default_markup": 15.0 }
/// }
/// ```
///
/// The subdomain is derived from the name (`my-shop`, or `my-shop1`, ...
/// if taken).
pub async fn create_store(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateStoreRequest>,
) -> Result<(StatusCode, Json<Storefront>), AppError> {
    let store = store_service::create_store(state.db.as_ref(), &principal, request).await?;
    Ok((StatusCode::CREATED, Json(store)))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(patch): Json<StoreSettingsPatch>,
) -> Result<Json<Storefront>, AppError> {
    Ok(Json(
        store_service::update_store_settings(state.db.as_ref(), &principal, patch).await?,
    ))
}

/// Update domain settings.
///
/// # Request Body
///
/// ```json
/// { "subdomain": "gamer-zone", "custom_domain": "shop.gamerzone.bd" }
/// ```
///
/// Send `"custom_domain": ""` to remove the custom domain.
pub async fn update_domain(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<UpdateDomainRequest>,
) -> Result<Json<Storefront>, AppError> {
    Ok(Json(
        store_service::update_domain_settings(
            state.db.as_ref(),
            &state.settings,
            &principal,
            request,
        )
        .await?,
    ))
}

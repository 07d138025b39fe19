//! Settlement core of a multi-tenant gaming top-up marketplace.
//!
//! Turns gateway payment callbacks into exactly one of {order paid, wallet
//! credited, reseller account created}, lets resellers pay for orders from
//! their prepaid wallet, and allocates storefront identities.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    Router,
    http::{Method, header},
    middleware as axum_middleware,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::ServiceSettings, db::Database, gateway::PaymentGateway,
    services::notification_service::Notifier,
};

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Arc<ServiceSettings>,
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    // Routes that require a session
    let authenticated_routes = Router::new()
        .route(
            "/api/v1/orders/{id}/pay",
            post(handlers::payments::pay_order),
        )
        .route(
            "/api/v1/reseller/orders/{id}/process",
            post(handlers::orders::process_order),
        )
        .route("/api/v1/reseller/wallet", get(handlers::wallet::get_wallet))
        .route(
            "/api/v1/reseller/wallet/topup",
            post(handlers::payments::topup_wallet),
        )
        .route(
            "/api/v1/reseller/store",
            get(handlers::stores::get_store).post(handlers::stores::create_store),
        )
        .route(
            "/api/v1/reseller/store/settings",
            patch(handlers::stores::update_settings),
        )
        .route(
            "/api/v1/reseller/store/domain",
            post(handlers::stores::update_domain),
        )
        .route("/api/v1/admin/refunds", post(handlers::payments::refund))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/v1/payments/callback",
            get(handlers::payments::callback),
        )
        .route(
            "/api/v1/resellers/register",
            post(handlers::payments::register_reseller),
        )
        .merge(authenticated_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors()),
        )
        .with_state(state)
}

/// Storefronts live on reseller subdomains and custom domains, so any origin
/// may call the API. Sessions travel in the `Authorization` header, never in
/// cookies.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

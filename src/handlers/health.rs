//! `GET /health`: liveness of the settlement service and its storage.

use crate::{AppState, error::AppError};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,

    /// Name of the payment gateway adapter callbacks are confirmed against
    pub gateway: &'static str,

    pub timestamp: DateTime<Utc>,
}

/// Reports `healthy` once storage answers a ping. The gateway is only named,
/// not contacted: a gateway outage fails payments, not the service.
///
/// An unreachable database surfaces as the standard 500 error body.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state.db.ping().await?;

    Ok(Json(HealthResponse {
        status: "healthy",
        database: "connected",
        gateway: state.gateway.name(),
        timestamp: Utc::now(),
    }))
}

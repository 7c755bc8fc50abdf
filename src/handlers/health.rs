//! Liveness of the key service and its dependencies.

use crate::{db, error::AppError, state::AppState};
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,

    /// `connected` once the key store answered a ping
    pub database: String,

    /// `configured` when a delivery gateway is set, `disabled` otherwise
    pub delivery: String,

    pub timestamp: DateTime<Utc>,
}

/// `GET /health`. Public, so load balancers and lock gateways can poll it.
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "connected",
///   "delivery": "disabled",
///   "timestamp": "2024-01-02T09:30:00Z"
/// }
/// ```
///
/// An unreachable key store yields the usual 500 `internal_error` body.
/// A missing delivery gateway does not fail the check.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, AppError> {
    db::ping(&state.store.pool).await?;

    let delivery = match state.config.delivery_api_url {
        Some(_) => "configured",
        None => "disabled",
    };

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database: "connected".to_string(),
        delivery: delivery.to_string(),
        timestamp: Utc::now(),
    }))
}

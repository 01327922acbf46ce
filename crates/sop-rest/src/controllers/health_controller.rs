//! Health check controller.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use sop_cache::ConnectionState;
use tracing::debug;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub cache: String,
}

/// Creates the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ready once the cache store answers.
///
/// Resolving the endpoint list performs the first connect when nothing has
/// used the cache yet; the ping afterwards reflects the current link.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let ready = match state.cache.endpoints().await {
        Ok(_) => state.cache.is_connected().await,
        Err(e) => {
            debug!(error = %e, "Cache not ready");
            false
        }
    };

    let cache: ConnectionState = state.cache.state();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            cache: cache.to_string(),
        }),
    )
}

pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}

//! Main application router.

use crate::{
    controllers::{health_controller, values_controller},
    middleware::logging_middleware,
    state::AppState,
};
use axum::{middleware, routing::get, Router};
use sop_config::ServerConfig;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Creates the application router.
pub fn create_router(state: AppState, server_config: &ServerConfig) -> Router {
    let router = Router::new()
        .merge(health_controller::router())
        .nest("/api/values", values_controller::router())
        .route("/", get(root))
        .with_state(state)
        .layer(create_cors_layer(server_config))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware));

    info!("Router created");
    router
}

fn create_cors_layer(server_config: &ServerConfig) -> CorsLayer {
    if server_config.cors_enabled {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

async fn root() -> &'static str {
    concat!("Sop API v", env!("CARGO_PKG_VERSION"))
}

//! Request logging middleware.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Logs method, path, status and latency of every request.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        warn!(target: "http", %method, %path, status = status.as_u16(), duration_ms, "HTTP request failed");
    } else {
        info!(target: "http", %method, %path, status = status.as_u16(), duration_ms, "HTTP request completed");
    }

    response
}

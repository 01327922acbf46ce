//! API response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sop_core::{ErrorResponse, SopError};

/// Error envelope: `{"success": false, "error": {"code", "message"}}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorResponse,
}

/// Application error type for Axum.
#[derive(Debug)]
pub struct AppError(pub SopError);

impl From<SopError> for AppError {
    fn from(err: SopError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorEnvelope {
            success: false,
            error: ErrorResponse::from_error(&self.0),
        });

        (status, body).into_response()
    }
}

/// Result type for Axum handlers.
pub type ApiResult<T> = Result<Json<T>, AppError>;

/// Wraps `data` in a 200 JSON response.
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(data))
}

//! Unified error types for the cache facade, repositories and HTTP layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for Sop.
#[derive(Error, Debug)]
pub enum SopError {
    // ============ Cache Errors ============
    /// No connection options were supplied for the key-value store.
    #[error("Redis connection string is empty")]
    ConfigurationMissing,

    /// The key-value store could not be reached.
    #[error("Redis service is not started: {0}")]
    ConnectionFailed(String),

    /// Stored bytes do not decode into the requested type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A command against the key-value store failed.
    #[error("Cache store error: {0}")]
    Store(String),

    /// An administrative command was issued without `allowAdmin=true`.
    #[error("Administrative commands are disabled; set allowAdmin=true in the connection options")]
    AdminDisabled,

    // ============ Infrastructure Errors ============
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SopError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::AdminDisabled => 403,
            Self::ConnectionFailed(_) => 503,
            Self::ConfigurationMissing
            | Self::Decode(_)
            | Self::Store(_)
            | Self::Database(_)
            | Self::Configuration(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "CACHE_CONFIGURATION_MISSING",
            Self::ConnectionFailed(_) => "CACHE_CONNECTION_FAILED",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Store(_) => "CACHE_ERROR",
            Self::AdminDisabled => "ADMIN_DISABLED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a store command error.
    #[must_use]
    pub fn store<T: Into<String>>(message: T) -> Self {
        Self::Store(message.into())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for SopError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SopError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Serializable error response for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new error response from a `SopError`.
    #[must_use]
    pub fn from_error(error: &SopError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<&SopError> for ErrorResponse {
    fn from(error: &SopError) -> Self {
        Self::from_error(error)
    }
}

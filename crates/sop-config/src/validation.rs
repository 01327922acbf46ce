//! Configuration validation.
//!
//! Collects every problem in one pass instead of failing on the first.

use crate::{AppConfig, RedisOptions};
use sop_core::SopError;
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    /// Port number is invalid.
    InvalidPort { value: u16 },
    /// Pool size must be at least one.
    InvalidPoolSize { value: u32 },
    /// Database URL is set but empty or not a MySQL URL.
    InvalidDatabaseUrl { url: String },
    /// Redis connection options could not be parsed.
    InvalidRedisOptions { message: String },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Log format is invalid.
    InvalidLogFormat { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort { value } => write!(f, "Invalid server port: {} (must be 1-65535)", value),
            Self::InvalidPoolSize { value } => {
                write!(f, "Invalid database pool size: {} (must be at least 1)", value)
            }
            Self::InvalidDatabaseUrl { url } => write!(f, "Invalid database URL: '{}'", url),
            Self::InvalidRedisOptions { message } => {
                write!(f, "Invalid Redis connection options: {}", message)
            }
            Self::InvalidLogLevel { value } => write!(
                f,
                "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                value
            ),
            Self::InvalidLogFormat { value } => {
                write!(f, "Invalid log format: '{}' (valid: pretty, json)", value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];
    const VALID_LOG_FORMATS: &'static [&'static str] = &["pretty", "json"];

    /// Validates the entire application configuration.
    ///
    /// An empty Redis connection string is accepted here; it surfaces as
    /// `ConfigurationMissing` on the first cache operation instead.
    ///
    /// # Errors
    ///
    /// Returns every validation error found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        if config.server.port == 0 {
            errors.push(ConfigValidationError::InvalidPort {
                value: config.server.port,
            });
        }

        if let Some(url) = &config.database.url {
            if !url.starts_with("mysql://") {
                errors.push(ConfigValidationError::InvalidDatabaseUrl { url: url.clone() });
            }
            if config.database.max_connections == 0 {
                errors.push(ConfigValidationError::InvalidPoolSize {
                    value: config.database.max_connections,
                });
            }
        }

        if config.redis.enabled && !config.redis.connection.trim().is_empty() {
            if let Err(e) = RedisOptions::parse(&config.redis.connection) {
                errors.push(ConfigValidationError::InvalidRedisOptions {
                    message: e.to_string(),
                });
            }
        }

        let level = config.observability.log_level.to_lowercase();
        if !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.observability.log_level.clone(),
            });
        }

        let format = config.observability.log_format.to_lowercase();
        if !Self::VALID_LOG_FORMATS.contains(&format.as_str()) {
            errors.push(ConfigValidationError::InvalidLogFormat {
                value: config.observability.log_format.clone(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates and folds all errors into a single `SopError::Configuration`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error listing every problem.
    pub fn validate_or_error(config: &AppConfig) -> Result<(), SopError> {
        Self::validate(config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            SopError::Configuration(joined)
        })
    }
}

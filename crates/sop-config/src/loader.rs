//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use sop_core::SopError;
use std::path::Path;
use tracing::{debug, info, warn};

/// Layered configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `SOP_` prefix
    ///
    /// # Errors
    ///
    /// Fails when a source cannot be read or the result does not validate.
    pub fn new(config_dir: impl Into<String>) -> Result<Self, SopError> {
        let config = Self::load_config(&config_dir.into())?;
        Ok(Self { config })
    }

    /// Loads configuration from the default location (`./config`).
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::new`].
    pub fn from_default_location() -> Result<Self, SopError> {
        Self::new("./config")
    }

    /// Returns the loaded configuration.
    #[must_use]
    pub fn get(&self) -> AppConfig {
        self.config.clone()
    }

    fn load_config(config_dir: &str) -> Result<AppConfig, SopError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var("SOP_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SOP")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_sop_error)?;
        let app_config: AppConfig = config.try_deserialize().map_err(config_error_to_sop_error)?;

        ConfigValidator::validate_or_error(&app_config)?;

        if app_config.redis.enabled && app_config.redis.connection.trim().is_empty() {
            warn!("Redis is enabled but no connection string is configured; cache operations will fail");
        }

        Ok(app_config)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn config_error_to_sop_error(err: ConfigError) -> SopError {
    SopError::Configuration(err.to_string())
}

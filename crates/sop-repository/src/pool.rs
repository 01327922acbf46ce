//! Database connection pool management.

use sop_config::DatabaseConfig;
use sop_core::{SopError, SopResult};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::sync::Arc;
use tracing::{info, warn};

/// MySQL pool wrapper.
pub struct DatabasePool {
    pool: MySqlPool,
}

impl DatabasePool {
    /// Opens a pool from configuration.
    ///
    /// # Errors
    ///
    /// `SopError::Configuration` without a URL, `SopError::Database` when
    /// the server cannot be reached.
    pub async fn connect(config: &DatabaseConfig) -> SopResult<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| SopError::Configuration("database.url is not set".to_string()))?;

        info!("Connecting to MySQL database...");
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                SopError::Database(format!("Failed to connect: {}", e))
            })?;

        info!("MySQL connection pool established");
        Ok(Self { pool })
    }

    /// Returns a reference to the underlying pool.
    #[must_use]
    pub fn inner(&self) -> &MySqlPool {
        &self.pool
    }

    /// Applies the workspace migrations.
    pub async fn run_migrations(&self) -> SopResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SopError::Database(format!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    pub async fn close(&self) {
        info!("Closing database connection pool...");
        self.pool.close().await;
    }
}

impl std::fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePool")
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}

/// Opens a shared pool.
pub async fn create_pool(config: &DatabaseConfig) -> SopResult<Arc<DatabasePool>> {
    DatabasePool::connect(config).await.map(Arc::new)
}

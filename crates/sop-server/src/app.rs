//! Dependency wiring.

use sop_cache::{build_cache_manager, spawn_liveness_check};
use sop_config::AppConfig;
use sop_core::SopResult;
use sop_repository::{
    create_pool, DatabasePool, InMemorySchoolRepository, MySqlSchoolRepository, SchoolRepository,
};
use sop_rest::AppState;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Schools served when no database is configured.
const DEMO_SCHOOLS: usize = 25;

/// Everything the server owns for its lifetime.
pub struct App {
    pub state: AppState,
    pool: Option<Arc<DatabasePool>>,
    liveness: Option<JoinHandle<()>>,
}

impl App {
    /// Builds the repository and cache manager from configuration.
    ///
    /// The cache connects lazily; nothing here touches Redis.
    pub async fn build(config: &AppConfig) -> SopResult<Self> {
        let (schools, pool) = build_repository(config).await?;
        let cache = build_cache_manager(&config.redis);

        let liveness = config.redis.liveness_interval().map(|every| {
            info!(interval_secs = every.as_secs(), "Starting cache liveness check");
            spawn_liveness_check(Arc::clone(&cache), every)
        });

        Ok(Self {
            state: AppState::new(schools, cache),
            pool,
            liveness,
        })
    }

    /// Stops the liveness check and closes the pool.
    pub async fn shutdown(self) {
        if let Some(liveness) = self.liveness {
            liveness.abort();
        }
        if let Some(pool) = self.pool {
            pool.close().await;
        }
    }
}

async fn build_repository(
    config: &AppConfig,
) -> SopResult<(Arc<dyn SchoolRepository>, Option<Arc<DatabasePool>>)> {
    if config.database.url.is_none() {
        warn!(
            count = DEMO_SCHOOLS,
            "database.url not set, serving generated schools from memory"
        );
        let repo: Arc<dyn SchoolRepository> = Arc::new(InMemorySchoolRepository::seeded(DEMO_SCHOOLS));
        return Ok((repo, None));
    }

    let pool = create_pool(&config.database).await?;
    pool.run_migrations().await?;
    let repo: Arc<dyn SchoolRepository> = Arc::new(MySqlSchoolRepository::new(Arc::clone(&pool)));
    Ok((repo, Some(pool)))
}

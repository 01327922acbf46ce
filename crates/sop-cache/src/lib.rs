//! # Sop Cache
//!
//! Cache manager facade over an external key-value store.
//!
//! ```text
//! Arc<dyn CacheManager>          (injected into consumers)
//!   StoreCacheManager
//!     CacheConnection            (connects once, on first use)
//!       Arc<dyn StoreConnector>  -> Arc<dyn KeyValueStore>
//!         RedisStore             (redis ConnectionManager per endpoint)
//!         MemoryStore            (in-process, Redis disabled / tests)
//! ```
//!
//! Values are stored as UTF-8 JSON (see [`codec`]).

pub mod codec;
mod connection;
mod manager;
mod memory;
mod redis_store;
mod store;

pub use connection::{CacheConnection, ConnectionState};
pub use manager::{spawn_liveness_check, CacheManager, CacheManagerExt, StoreCacheManager};
pub use memory::{MemoryConnector, MemoryStore};
pub use redis_store::{RedisConnector, RedisStore};
pub use store::{contains_pattern, glob_matches, KeyValueStore, StoreConnector};

use sop_config::RedisConfig;
use std::sync::Arc;
use tracing::info;

/// Builds the process-wide cache manager from configuration.
///
/// With Redis disabled the manager runs against an in-process store.
#[must_use]
pub fn build_cache_manager(config: &RedisConfig) -> Arc<dyn CacheManager> {
    let connector: Arc<dyn StoreConnector> = if config.enabled {
        info!("Cache backed by Redis");
        Arc::new(RedisConnector::new(config.connection.clone()))
    } else {
        info!("Redis disabled, cache backed by in-process store");
        Arc::new(MemoryConnector::default())
    };

    Arc::new(StoreCacheManager::new(connector))
}

//! In-process key-value store.
//!
//! Used when Redis is disabled and in tests. Keys are spread over one
//! keyspace per endpoint by hash, the way a cluster routes them, so
//! per-endpoint scans only see their own share. Every endpoint is writable;
//! there is no master/replica split here. Replication topologies are handled
//! by `RedisStore`, which routes writes to the master.

use crate::store::{glob_matches, KeyValueStore, StoreConnector};
use async_trait::async_trait;
use parking_lot::Mutex;
use sop_config::Endpoint;
use sop_core::{SopError, SopResult};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

struct Shard {
    endpoint: Endpoint,
    entries: Mutex<HashMap<String, Entry>>,
}

/// In-memory store with per-key expiry.
pub struct MemoryStore {
    shards: Vec<Shard>,
    allow_admin: bool,
}

impl MemoryStore {
    /// Creates a store with a single local endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::with_endpoints(vec![Endpoint::new("memory", 0)])
    }

    /// Creates a store with one keyspace per endpoint.
    ///
    /// # Panics
    ///
    /// Panics if `endpoints` is empty.
    #[must_use]
    pub fn with_endpoints(endpoints: Vec<Endpoint>) -> Self {
        assert!(!endpoints.is_empty(), "MemoryStore needs at least one endpoint");
        Self {
            shards: endpoints
                .into_iter()
                .map(|endpoint| Shard {
                    endpoint,
                    entries: Mutex::new(HashMap::new()),
                })
                .collect(),
            allow_admin: true,
        }
    }

    /// Sets whether `flush_db` is permitted.
    #[must_use]
    pub fn with_admin(mut self, allow_admin: bool) -> Self {
        self.allow_admin = allow_admin;
        self
    }

    /// Endpoint that owns `key`.
    #[must_use]
    pub fn endpoint_for(&self, key: &str) -> &Endpoint {
        &self.shard_for(key).endpoint
    }

    /// Number of live keys across all endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|s| s.entries.lock().values().filter(|e| e.is_live(now)).count())
            .sum()
    }

    /// Returns true if no live keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = usize::try_from(hasher.finish() % self.shards.len() as u64).unwrap_or(0);
        &self.shards[index]
    }

    fn shard_at(&self, endpoint: &Endpoint) -> SopResult<&Shard> {
        self.shards
            .iter()
            .find(|s| &s.endpoint == endpoint)
            .ok_or_else(|| SopError::store(format!("unknown endpoint {}", endpoint)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> SopResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.shard_for(key).entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> SopResult<()> {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.shard_for(key).entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn exists(&self, key: &str) -> SopResult<bool> {
        let now = Instant::now();
        Ok(self
            .shard_for(key)
            .entries
            .lock()
            .get(key)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn delete(&self, key: &str) -> SopResult<bool> {
        let now = Instant::now();
        Ok(self
            .shard_for(key)
            .entries
            .lock()
            .remove(key)
            .is_some_and(|e| e.is_live(now)))
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.shards.iter().map(|s| s.endpoint.clone()).collect()
    }

    async fn scan(&self, endpoint: &Endpoint, pattern: &str) -> SopResult<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.shard_at(endpoint)?.entries.lock();
        entries.retain(|_, e| e.is_live(now));
        Ok(entries
            .keys()
            .filter(|key| glob_matches(pattern, key))
            .cloned()
            .collect())
    }

    async fn flush_db(&self, endpoint: &Endpoint, _database: Option<i64>) -> SopResult<()> {
        self.shard_at(endpoint)?.entries.lock().clear();
        Ok(())
    }

    fn allows_admin(&self) -> bool {
        self.allow_admin
    }

    async fn ping(&self) -> SopResult<()> {
        Ok(())
    }
}

/// Connector handing out a shared [`MemoryStore`].
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    /// Creates a connector for `store`.
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            connects: AtomicUsize::new(0),
        }
    }

    /// Number of times `connect` has been called.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self) -> SopResult<Arc<dyn KeyValueStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let store: Arc<dyn KeyValueStore> = self.store.clone();
        Ok(store)
    }
}

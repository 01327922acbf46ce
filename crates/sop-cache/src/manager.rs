//! Cache manager facade.

use crate::codec;
use crate::connection::{CacheConnection, ConnectionState};
use crate::store::{contains_pattern, KeyValueStore, StoreConnector};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sop_config::Endpoint;
use sop_core::{SopError, SopResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cache operations over an external key-value store.
///
/// Values cross this trait as encoded bytes so it stays object safe; the
/// typed helpers live in [`CacheManagerExt`].
///
/// Fire-and-forget operations (`set_raw`, `remove`) return once the command
/// is handed to the runtime. Their store errors are logged and dropped, so a
/// failed write is invisible to the caller. Use the `_confirmed` variants
/// when the outcome matters.
#[async_trait]
pub trait CacheManager: Send + Sync {
    /// Returns the stored bytes, or `None` if the key does not exist.
    async fn get_raw(&self, key: &str) -> SopResult<Option<Vec<u8>>>;

    /// Stores bytes with an expiry without waiting for the store.
    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SopResult<()>;

    /// Stores bytes with an expiry and waits for the acknowledgement.
    async fn set_raw_confirmed(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SopResult<()>;

    /// Checks whether the key exists.
    async fn is_set(&self, key: &str) -> SopResult<bool>;

    /// Deletes the key without waiting for the store.
    async fn remove(&self, key: &str) -> SopResult<()>;

    /// Deletes the key and reports whether it existed.
    async fn remove_confirmed(&self, key: &str) -> SopResult<bool>;

    /// Deletes every key, on every endpoint, that contains `pattern` as a
    /// substring. Returns the number of keys deleted.
    ///
    /// Keys written while the scan runs may or may not be caught.
    async fn remove_by_pattern(&self, pattern: &str) -> SopResult<u64>;

    /// Deletes every key on every endpoint one by one, without issuing an
    /// administrative flush. Returns the number of keys deleted.
    async fn clear(&self) -> SopResult<u64>;

    /// Flushes the database on every endpoint. Needs `allowAdmin=true`.
    async fn flush_db(&self, database: Option<i64>) -> SopResult<()>;

    /// Endpoints known to the connection.
    async fn endpoints(&self) -> SopResult<Vec<Endpoint>>;

    /// Liveness check; `false` before the first connect.
    async fn is_connected(&self) -> bool;

    /// Connection lifecycle state.
    fn state(&self) -> ConnectionState;
}

/// Typed helpers over [`CacheManager`], using the JSON codec.
#[async_trait]
pub trait CacheManagerExt: CacheManager {
    /// Gets a typed value.
    ///
    /// A missing key is `Ok(None)`; bytes that do not decode into `T` are
    /// `SopError::Decode`.
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> SopResult<Option<T>> {
        match self.get_raw(key).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Sets a typed value, fire-and-forget. Values that encode to JSON
    /// `null` are skipped.
    ///
    /// A TTL under one millisecond is refused the way Redis refuses `PX 0`;
    /// the refusal is logged and nothing is stored.
    async fn set<T: Serialize + Sync + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> SopResult<()> {
        match codec::encode(value)? {
            Some(bytes) => self.set_raw(key, bytes, ttl).await,
            None => Ok(()),
        }
    }

    /// Sets a typed value with a TTL in whole minutes, fire-and-forget.
    /// Zero minutes stores nothing.
    async fn set_minutes<T: Serialize + Sync + ?Sized>(&self, key: &str, value: &T, minutes: u64) -> SopResult<()> {
        self.set(key, value, Duration::from_secs(minutes.saturating_mul(60)))
            .await
    }

    /// Sets a typed value and waits for the acknowledgement. A TTL under one
    /// millisecond is `SopError::Store`.
    async fn set_confirmed<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> SopResult<()> {
        match codec::encode(value)? {
            Some(bytes) => self.set_raw_confirmed(key, bytes, ttl).await,
            None => Ok(()),
        }
    }

    /// Gets a value or computes and caches it if not present.
    async fn get_or_set<T, F, Fut>(&self, key: &str, ttl: Duration, factory: F) -> SopResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = SopResult<T>> + Send,
    {
        if let Some(cached) = self.get::<T>(key).await? {
            return Ok(cached);
        }

        let value = factory().await?;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }
}

impl<M: CacheManager + ?Sized> CacheManagerExt for M {}

/// Shortest expiry the store accepts (`SET ... PX 1`).
const MIN_TTL: Duration = Duration::from_millis(1);

/// Rejects expiries Redis would refuse with `invalid expire time`.
fn checked_ttl(key: &str, ttl: Duration) -> SopResult<Duration> {
    if ttl < MIN_TTL {
        return Err(SopError::store(format!(
            "invalid expire time {:?} in 'set' command for key '{}'",
            ttl, key
        )));
    }
    Ok(ttl)
}

/// [`CacheManager`] over a lazily connected [`KeyValueStore`].
///
/// Construct one per process and share it as `Arc<dyn CacheManager>`.
pub struct StoreCacheManager {
    connection: CacheConnection,
}

impl StoreCacheManager {
    /// Creates a manager. Nothing connects until the first operation.
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connection: CacheConnection::new(connector),
        }
    }

    async fn store(&self) -> SopResult<Arc<dyn KeyValueStore>> {
        self.connection.store().await
    }

    async fn delete_matching(&self, pattern: &str) -> SopResult<u64> {
        let store = self.store().await?;
        let mut deleted = 0u64;

        for endpoint in store.endpoints() {
            let keys = store.scan(&endpoint, pattern).await?;
            for key in &keys {
                if store.delete(key).await? {
                    deleted += 1;
                }
            }
            debug!(endpoint = %endpoint, pattern, scanned = keys.len(), "Deleted scanned keys");
        }

        Ok(deleted)
    }
}

#[async_trait]
impl CacheManager for StoreCacheManager {
    async fn get_raw(&self, key: &str) -> SopResult<Option<Vec<u8>>> {
        let value = self.store().await?.get(key).await?;

        match &value {
            Some(_) => debug!("Cache hit for key '{}'", key),
            None => debug!("Cache miss for key '{}'", key),
        }

        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SopResult<()> {
        let store = self.store().await?;
        let ttl = match checked_ttl(key, ttl) {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(key = %key, error = %e, "Fire-and-forget cache write failed");
                return Ok(());
            }
        };
        let key = key.to_string();

        tokio::spawn(async move {
            if let Err(e) = store.set(&key, value, Some(ttl)).await {
                warn!(key = %key, error = %e, "Fire-and-forget cache write failed");
            }
        });

        Ok(())
    }

    async fn set_raw_confirmed(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SopResult<()> {
        let store = self.store().await?;
        store.set(key, value, Some(checked_ttl(key, ttl)?)).await?;
        debug!("Cached key '{}' with TTL {:?}", key, ttl);
        Ok(())
    }

    async fn is_set(&self, key: &str) -> SopResult<bool> {
        self.store().await?.exists(key).await
    }

    async fn remove(&self, key: &str) -> SopResult<()> {
        let store = self.store().await?;
        let key = key.to_string();

        tokio::spawn(async move {
            if let Err(e) = store.delete(&key).await {
                warn!(key = %key, error = %e, "Fire-and-forget cache delete failed");
            }
        });

        Ok(())
    }

    async fn remove_confirmed(&self, key: &str) -> SopResult<bool> {
        let deleted = self.store().await?.delete(key).await?;
        debug!("Deleted key '{}': {}", key, deleted);
        Ok(deleted)
    }

    async fn remove_by_pattern(&self, pattern: &str) -> SopResult<u64> {
        let deleted = self.delete_matching(&contains_pattern(pattern)).await?;
        debug!("Deleted {} keys containing '{}'", deleted, pattern);
        Ok(deleted)
    }

    async fn clear(&self) -> SopResult<u64> {
        let deleted = self.delete_matching("*").await?;
        info!("Cleared {} cache keys", deleted);
        Ok(deleted)
    }

    async fn flush_db(&self, database: Option<i64>) -> SopResult<()> {
        let store = self.store().await?;
        if !store.allows_admin() {
            return Err(SopError::AdminDisabled);
        }

        for endpoint in store.endpoints() {
            store.flush_db(&endpoint, database).await?;
            info!(endpoint = %endpoint, ?database, "Flushed database");
        }

        Ok(())
    }

    async fn endpoints(&self) -> SopResult<Vec<Endpoint>> {
        Ok(self.store().await?.endpoints())
    }

    async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    fn state(&self) -> ConnectionState {
        self.connection.state()
    }
}

/// Periodically pings the connection so a dropped link is noticed, and
/// re-checked, before the next operation.
pub fn spawn_liveness_check(manager: Arc<dyn CacheManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if manager.state() == ConnectionState::Uninitialized {
                continue;
            }
            let connected = manager.is_connected().await;
            debug!(connected, state = %manager.state(), "Cache liveness check");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryStore};
    use crate::store::MockKeyValueStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct School {
        id: i64,
        name: String,
    }

    struct FixedConnector(Arc<dyn KeyValueStore>);

    #[async_trait]
    impl StoreConnector for FixedConnector {
        async fn connect(&self) -> SopResult<Arc<dyn KeyValueStore>> {
            Ok(Arc::clone(&self.0))
        }
    }

    fn memory_manager() -> (Arc<MemoryStore>, StoreCacheManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = StoreCacheManager::new(Arc::new(MemoryConnector::new(store.clone())));
        (store, manager)
    }

    fn mock_manager(mock: MockKeyValueStore) -> StoreCacheManager {
        StoreCacheManager::new(Arc::new(FixedConnector(Arc::new(mock))))
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_, manager) = memory_manager();
        let value: Option<School> = manager.get("never-written").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_set_confirmed_then_get() {
        let (_, manager) = memory_manager();
        let school = School { id: 1, name: "North".into() };

        manager
            .set_confirmed("school:1", &school, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(manager.is_set("school:1").await.unwrap());
        assert_eq!(manager.get::<School>("school:1").await.unwrap(), Some(school));
    }

    #[tokio::test]
    async fn test_stores_json_bytes() {
        let (store, manager) = memory_manager();
        manager
            .set_confirmed("n", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("n").await.unwrap(), Some(b"[1,2,3]".to_vec()));
    }

    #[tokio::test]
    async fn test_null_value_not_stored() {
        let (store, manager) = memory_manager();
        manager
            .set("absent", &Option::<School>::None, Duration::from_secs(60))
            .await
            .unwrap();
        manager
            .set_confirmed("absent", &Option::<School>::None, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_decode_error() {
        let (_, manager) = memory_manager();
        manager
            .set_confirmed("school:1", "just a string", Duration::from_secs(60))
            .await
            .unwrap();

        let err = manager.get::<School>("school:1").await.unwrap_err();
        assert!(matches!(err, SopError::Decode(_)));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_stored() {
        let (store, manager) = memory_manager();

        manager.set_minutes("never", &1, 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!manager.is_set("never").await.unwrap());

        let err = manager
            .set_confirmed("never", &1, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SopError::Store(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sub_millisecond_ttl_rejected() {
        let (_, manager) = memory_manager();
        let err = manager
            .set_confirmed("brief", &1, Duration::from_micros(500))
            .await
            .unwrap_err();
        assert!(matches!(err, SopError::Store(_)));

        manager
            .set_confirmed("brief", &1, Duration::from_millis(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_confirmed() {
        let (_, manager) = memory_manager();
        manager.set_confirmed("k", &1, Duration::from_secs(60)).await.unwrap();
        assert!(manager.remove_confirmed("k").await.unwrap());
        assert!(!manager.is_set("k").await.unwrap());
        assert!(!manager.remove_confirmed("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_or_set_caches_factory_value() {
        let (store, manager) = memory_manager();

        let first = manager
            .get_or_set("computed", Duration::from_secs(60), || async { Ok(7u32) })
            .await
            .unwrap();
        assert_eq!(first, 7);

        store.set("computed", b"9".to_vec(), None).await.unwrap();
        let second = manager
            .get_or_set("computed", Duration::from_secs(60), || async { Ok(0u32) })
            .await
            .unwrap();
        assert_eq!(second, 9);
    }

    #[tokio::test]
    async fn test_store_error_surfaces_on_get() {
        let mut mock = MockKeyValueStore::new();
        mock.expect_endpoints().returning(Vec::new);
        mock.expect_get()
            .returning(|_| Err(SopError::store("WRONGTYPE Operation against a key")));

        let err = mock_manager(mock).get_raw("k").await.unwrap_err();
        assert!(matches!(err, SopError::Store(_)));
    }

    #[tokio::test]
    async fn test_fire_and_forget_discards_store_errors() {
        let mut mock = MockKeyValueStore::new();
        mock.expect_endpoints().returning(Vec::new);
        mock.expect_set()
            .returning(|_, _, _| Err(SopError::ConnectionFailed("broken pipe".into())));
        mock.expect_delete()
            .returning(|_| Err(SopError::ConnectionFailed("broken pipe".into())));

        let manager = mock_manager(mock);
        manager.set("k", &1, Duration::from_secs(60)).await.unwrap();
        manager.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_confirmed_write_surfaces_store_errors() {
        let mut mock = MockKeyValueStore::new();
        mock.expect_endpoints().returning(Vec::new);
        mock.expect_set()
            .returning(|_, _, _| Err(SopError::store("OOM command not allowed")));

        let err = mock_manager(mock)
            .set_confirmed("k", &1, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, SopError::Store(_)));
    }

    #[tokio::test]
    async fn test_flush_requires_admin() {
        let store = Arc::new(MemoryStore::new().with_admin(false));
        let manager = StoreCacheManager::new(Arc::new(MemoryConnector::new(store.clone())));
        manager.set_confirmed("k", &1, Duration::from_secs(60)).await.unwrap();

        let err = manager.flush_db(None).await.unwrap_err();
        assert!(matches!(err, SopError::AdminDisabled));
        assert!(manager.is_set("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_flush_with_admin() {
        let (_, manager) = memory_manager();
        manager.set_confirmed("k", &1, Duration::from_secs(60)).await.unwrap();
        manager.flush_db(Some(0)).await.unwrap();
        assert!(!manager.is_set("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_does_not_flush() {
        let mut mock = MockKeyValueStore::new();
        let listed = Endpoint::new("cache", 6379);
        mock.expect_endpoints().returning(move || vec![listed.clone()]);
        mock.expect_scan()
            .withf(|_, pattern| pattern == "*")
            .returning(|_, _| Ok(vec!["a".to_string(), "b".to_string()]));
        mock.expect_delete().times(2).returning(|_| Ok(true));
        mock.expect_flush_db().never();

        assert_eq!(mock_manager(mock).clear().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_state_follows_first_use() {
        let (_, manager) = memory_manager();
        assert_eq!(manager.state(), ConnectionState::Uninitialized);
        manager.endpoints().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_check_marks_disconnected_and_next_use_repings() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pings = Arc::new(AtomicUsize::new(0));
        let counter = pings.clone();
        let mut mock = MockKeyValueStore::new();
        mock.expect_endpoints().returning(Vec::new);
        mock.expect_get().returning(|_| Ok(None));
        // The first ping fails, every later ping answers.
        mock.expect_ping().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SopError::ConnectionFailed("connection reset".into()))
            } else {
                Ok(())
            }
        });

        let manager: Arc<dyn CacheManager> = Arc::new(mock_manager(mock));
        manager.get_raw("k").await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(pings.load(Ordering::SeqCst), 0);

        let checker = spawn_liveness_check(Arc::clone(&manager), Duration::from_secs(30));
        for _ in 0..100 {
            if manager.state() == ConnectionState::Disconnected {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(pings.load(Ordering::SeqCst), 1);

        // Clock is paused, so no second tick has fired; the operation re-pings.
        manager.get_raw("k").await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(pings.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        for _ in 0..100 {
            if pings.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(pings.load(Ordering::SeqCst), 3);
        assert_eq!(manager.state(), ConnectionState::Connected);

        checker.abort();
    }
}

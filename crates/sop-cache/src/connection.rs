//! Lazily established, shared store connection.

use crate::store::{KeyValueStore, StoreConnector};
use sop_core::{SopError, SopResult};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Lifecycle of a [`CacheConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection attempt has succeeded yet.
    Uninitialized = 0,
    /// A connect or reconnect is in flight.
    Connecting = 1,
    /// The last operation or ping reached the store.
    Connected = 2,
    /// The last liveness check failed.
    Disconnected = 3,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnected,
            _ => Self::Uninitialized,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// One store handle, created on first use and shared by every operation.
///
/// Concurrent first callers wait on the same initialization; exactly one of
/// them runs the connector. A failed attempt leaves the cell empty so the
/// next operation tries again. The handle lives as long as the connection
/// value; there is no separate teardown step.
pub struct CacheConnection {
    connector: Arc<dyn StoreConnector>,
    store: OnceCell<Arc<dyn KeyValueStore>>,
    state: AtomicU8,
}

impl CacheConnection {
    /// Creates an unconnected handle.
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            store: OnceCell::new(),
            state: AtomicU8::new(ConnectionState::Uninitialized as u8),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Returns the store, connecting first if needed.
    ///
    /// After a failed liveness check the store is pinged before being handed
    /// out; the client reconnects underneath and the state returns to
    /// `Connected`.
    ///
    /// # Errors
    ///
    /// The connector's error on a failed first connect, or
    /// `SopError::ConnectionFailed` when a disconnected store still does not
    /// answer.
    pub async fn store(&self) -> SopResult<Arc<dyn KeyValueStore>> {
        let store = match self.store.get() {
            Some(store) => Arc::clone(store),
            None => Arc::clone(self.store.get_or_try_init(|| self.open()).await?),
        };

        if self.state() == ConnectionState::Disconnected {
            self.set_state(ConnectionState::Connecting);
            match store.ping().await {
                Ok(()) => {
                    self.set_state(ConnectionState::Connected);
                    info!("Key-value store connection restored");
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(match e {
                        SopError::ConnectionFailed(_) => e,
                        other => SopError::ConnectionFailed(other.to_string()),
                    });
                }
            }
        }

        Ok(store)
    }

    async fn open(&self) -> SopResult<Arc<dyn KeyValueStore>> {
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to key-value store");

        match self.connector.connect().await {
            Ok(store) => {
                self.set_state(ConnectionState::Connected);
                info!(endpoints = store.endpoints().len(), "Key-value store connected");
                Ok(store)
            }
            Err(e) => {
                self.set_state(ConnectionState::Uninitialized);
                warn!(error = %e, "Key-value store connection failed");
                Err(e)
            }
        }
    }

    /// Liveness check. Never connects; `false` before the first connect.
    pub async fn is_connected(&self) -> bool {
        let Some(store) = self.store.get() else {
            return false;
        };

        match store.ping().await {
            Ok(()) => {
                if self.state() != ConnectionState::Connected {
                    info!("Key-value store answering again");
                    self.set_state(ConnectionState::Connected);
                }
                true
            }
            Err(e) => {
                if self.state() != ConnectionState::Disconnected {
                    warn!(error = %e, "Key-value store liveness check failed");
                    self.set_state(ConnectionState::Disconnected);
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryStore};
    use crate::store::MockKeyValueStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FailingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl StoreConnector for FailingConnector {
        async fn connect(&self) -> SopResult<Arc<dyn KeyValueStore>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SopError::ConfigurationMissing)
        }
    }

    struct FixedConnector(Arc<dyn KeyValueStore>);

    #[async_trait]
    impl StoreConnector for FixedConnector {
        async fn connect(&self) -> SopResult<Arc<dyn KeyValueStore>> {
            Ok(Arc::clone(&self.0))
        }
    }

    #[tokio::test]
    async fn test_connects_once() {
        let connector = Arc::new(MemoryConnector::new(Arc::new(MemoryStore::new())));
        let connection = CacheConnection::new(connector.clone());
        assert_eq!(connection.state(), ConnectionState::Uninitialized);
        assert!(!connection.is_connected().await);

        connection.store().await.unwrap();
        connection.store().await.unwrap();

        assert_eq!(connector.connect_count(), 1);
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(connection.is_connected().await);
    }

    #[tokio::test]
    async fn test_failed_connect_is_retried() {
        let connector = Arc::new(FailingConnector {
            attempts: AtomicUsize::new(0),
        });
        let connection = CacheConnection::new(connector.clone());

        let err = connection.store().await.err().unwrap();
        assert!(matches!(err, SopError::ConfigurationMissing));
        assert_eq!(connection.state(), ConnectionState::Uninitialized);

        assert!(connection.store().await.is_err());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reconnect_after_failed_ping() {
        let pings = Arc::new(AtomicUsize::new(0));
        let mut mock = MockKeyValueStore::new();
        let counter = pings.clone();
        // First ping fails, later ones succeed.
        mock.expect_ping().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SopError::ConnectionFailed("reset by peer".into()))
            } else {
                Ok(())
            }
        });
        mock.expect_endpoints().returning(Vec::new);

        let connection = CacheConnection::new(Arc::new(FixedConnector(Arc::new(mock))));
        connection.store().await.unwrap();

        assert!(!connection.is_connected().await);
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        connection.store().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(pings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disconnected_store_surfaces_error() {
        let mut mock = MockKeyValueStore::new();
        mock.expect_ping()
            .returning(|| Err(SopError::store("LOADING Redis is loading the dataset")));
        mock.expect_endpoints().returning(Vec::new);

        let connection = CacheConnection::new(Arc::new(FixedConnector(Arc::new(mock))));
        connection.store().await.unwrap();
        assert!(!connection.is_connected().await);

        let err = connection.store().await.err().unwrap();
        assert!(matches!(err, SopError::ConnectionFailed(_)));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use() {
        struct SlowConnector {
            inner: MemoryConnector,
        }

        #[async_trait]
        impl StoreConnector for SlowConnector {
            async fn connect(&self) -> SopResult<Arc<dyn KeyValueStore>> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.inner.connect().await
            }
        }

        let connector = Arc::new(SlowConnector {
            inner: MemoryConnector::default(),
        });
        let connection = Arc::new(CacheConnection::new(connector.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let connection = connection.clone();
                tokio::spawn(async move { connection.store().await.map(|_| ()) })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        assert_eq!(connector.inner.connect_count(), 1);
    }
}

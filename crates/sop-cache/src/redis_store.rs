//! Redis-backed key-value store.

use crate::store::{KeyValueStore, StoreConnector};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Value};
use sop_config::{Endpoint, RedisOptions};
use sop_core::{SopError, SopResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Replication role reported by `ROLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeRole {
    Master,
    Replica,
    /// `ROLE` was rejected (ACL, proxy) or answered with something else.
    Unknown,
}

struct RedisNode {
    endpoint: Endpoint,
    conn: ConnectionManager,
    role: NodeRole,
}

/// Redis store over one multiplexed connection per endpoint.
///
/// Data commands go to the master, whatever its position in the endpoint
/// list. Each `ConnectionManager` re-establishes its link on its own after a
/// drop.
pub struct RedisStore {
    nodes: Vec<RedisNode>,
    primary: usize,
    options: RedisOptions,
}

impl RedisStore {
    /// Connects to every endpoint in `options` and asks each for its role.
    ///
    /// Unreachable endpoints are skipped with a warning. The master becomes
    /// the primary node; when no node reports a role (e.g. `ROLE` is denied)
    /// the first such node is used instead.
    ///
    /// # Errors
    ///
    /// `SopError::ConfigurationMissing` without endpoints,
    /// `SopError::ConnectionFailed` when no endpoint answers or only
    /// replicas do.
    pub async fn connect(options: RedisOptions) -> SopResult<Self> {
        if options.endpoints.is_empty() {
            return Err(SopError::ConfigurationMissing);
        }

        let mut nodes = Vec::with_capacity(options.endpoints.len());
        let mut last_error = None;

        for endpoint in &options.endpoints {
            let connected = match Self::connect_node(&options, endpoint).await {
                Ok(mut conn) => node_role(&mut conn, endpoint).await.map(|role| (conn, role)),
                Err(e) => Err(e),
            };

            match connected {
                Ok((conn, role)) => {
                    info!(endpoint = %endpoint, db = options.database, ?role, "Connected to Redis endpoint");
                    nodes.push(RedisNode {
                        endpoint: endpoint.clone(),
                        conn,
                        role,
                    });
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Redis endpoint unreachable");
                    last_error = Some(e);
                }
            }
        }

        if nodes.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| SopError::ConnectionFailed("no endpoint reachable".to_string())));
        }

        let roles: Vec<NodeRole> = nodes.iter().map(|n| n.role).collect();
        let primary = pick_primary(&roles).ok_or_else(|| {
            SopError::ConnectionFailed(format!(
                "no master among reachable endpoints: {}",
                nodes
                    .iter()
                    .map(|n| n.endpoint.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;
        info!(endpoint = %nodes[primary].endpoint, "Using Redis primary");

        Ok(Self {
            nodes,
            primary,
            options,
        })
    }

    async fn connect_node(options: &RedisOptions, endpoint: &Endpoint) -> SopResult<ConnectionManager> {
        let client = open_client(options, endpoint, options.database)?;
        tokio::time::timeout(options.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                SopError::ConnectionFailed(format!(
                    "timed out after {:?} connecting to {}",
                    options.connect_timeout, endpoint
                ))
            })?
            .map_err(|e| SopError::ConnectionFailed(format!("{}: {}", endpoint, e)))
    }

    fn primary(&self) -> ConnectionManager {
        self.nodes[self.primary].conn.clone()
    }

    fn node(&self, endpoint: &Endpoint) -> SopResult<&RedisNode> {
        self.nodes
            .iter()
            .find(|n| &n.endpoint == endpoint)
            .ok_or_else(|| SopError::store(format!("endpoint {} is not connected", endpoint)))
    }
}

/// Asks a node for its replication role. Only a dead link is an error.
async fn node_role(conn: &mut ConnectionManager, endpoint: &Endpoint) -> SopResult<NodeRole> {
    match redis::cmd("ROLE").query_async::<Value>(conn).await {
        Ok(reply) => Ok(parse_role(&reply)),
        Err(e) => match map_redis_error(&format!("ROLE on {}", endpoint), e) {
            err @ SopError::ConnectionFailed(_) => Err(err),
            err => {
                debug!(endpoint = %endpoint, error = %err, "ROLE not available");
                Ok(NodeRole::Unknown)
            }
        },
    }
}

fn parse_role(reply: &Value) -> NodeRole {
    let Value::Array(items) = reply else {
        return NodeRole::Unknown;
    };
    let name = items
        .first()
        .and_then(|v| redis::from_redis_value::<String>(v).ok());

    match name.as_deref() {
        Some("master") => NodeRole::Master,
        Some("slave" | "replica") => NodeRole::Replica,
        _ => NodeRole::Unknown,
    }
}

/// Index of the node that takes writes: the first master, else the first
/// node of unknown role. Replicas are never chosen.
fn pick_primary(roles: &[NodeRole]) -> Option<usize> {
    roles
        .iter()
        .position(|r| *r == NodeRole::Master)
        .or_else(|| roles.iter().position(|r| *r == NodeRole::Unknown))
}

/// Builds a client for `endpoint` selecting `database`.
fn open_client(options: &RedisOptions, endpoint: &Endpoint, database: i64) -> SopResult<Client> {
    let url = connection_url(options, endpoint, database)?;
    Client::open(url.as_str()).map_err(|e| SopError::ConnectionFailed(format!("{}: {}", endpoint, e)))
}

fn connection_url(options: &RedisOptions, endpoint: &Endpoint, database: i64) -> SopResult<Url> {
    let scheme = if options.ssl { "rediss" } else { "redis" };
    let mut url = Url::parse(&format!("{}://{}/{}", scheme, endpoint, database))
        .map_err(|e| SopError::Configuration(format!("invalid Redis endpoint {}: {}", endpoint, e)))?;

    if let Some(username) = &options.username {
        url.set_username(username)
            .map_err(|()| SopError::Configuration("Redis user name not accepted".to_string()))?;
    }
    if let Some(password) = &options.password {
        url.set_password(Some(password))
            .map_err(|()| SopError::Configuration("Redis password not accepted".to_string()))?;
    }

    Ok(url)
}

/// Classifies a client error: unreachable store vs failed command.
#[allow(clippy::needless_pass_by_value)]
fn map_redis_error(context: &str, err: RedisError) -> SopError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
        SopError::ConnectionFailed(format!("{}: {}", context, err))
    } else {
        SopError::Store(format!("{}: {}", context, err))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> SopResult<Option<Vec<u8>>> {
        let mut conn = self.primary();
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| map_redis_error(&format!("GET '{}'", key), e))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> SopResult<()> {
        let mut conn = self.primary();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }
        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error(&format!("SET '{}'", key), e))
    }

    async fn exists(&self, key: &str) -> SopResult<bool> {
        let mut conn = self.primary();
        redis::cmd("EXISTS")
            .arg(key)
            .query_async::<bool>(&mut conn)
            .await
            .map_err(|e| map_redis_error(&format!("EXISTS '{}'", key), e))
    }

    async fn delete(&self, key: &str) -> SopResult<bool> {
        let mut conn = self.primary();
        let deleted = redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| map_redis_error(&format!("DEL '{}'", key), e))?;
        Ok(deleted > 0)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.nodes.iter().map(|n| n.endpoint.clone()).collect()
    }

    async fn scan(&self, endpoint: &Endpoint, pattern: &str) -> SopResult<Vec<String>> {
        let mut conn = self.node(endpoint)?.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| map_redis_error(&format!("SCAN on {}", endpoint), e))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        debug!(endpoint = %endpoint, pattern, count = keys.len(), "Scanned keys");
        Ok(keys)
    }

    async fn flush_db(&self, endpoint: &Endpoint, database: Option<i64>) -> SopResult<()> {
        let node = self.node(endpoint)?;
        if node.role == NodeRole::Replica {
            // replicas are read-only; they follow the master's flush
            debug!(endpoint = %endpoint, "Skipping FLUSHDB on replica");
            return Ok(());
        }
        let context = format!("FLUSHDB on {}", endpoint);

        match database.filter(|db| *db >= 0 && *db != self.options.database) {
            None => {
                let mut conn = node.conn.clone();
                redis::cmd("FLUSHDB")
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| map_redis_error(&context, e))
            }
            Some(db) => {
                let client = open_client(&self.options, endpoint, db)?;
                let mut conn = client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| map_redis_error(&context, e))?;
                redis::cmd("FLUSHDB")
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| map_redis_error(&context, e))
            }
        }
    }

    fn allows_admin(&self) -> bool {
        self.options.allow_admin
    }

    async fn ping(&self) -> SopResult<()> {
        let mut conn = self.primary();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| map_redis_error("PING", e))
    }
}

/// Connector that parses a connection options string and opens a
/// [`RedisStore`].
pub struct RedisConnector {
    connection: String,
}

impl RedisConnector {
    /// Creates a connector. The string is parsed on `connect`, so an empty
    /// one surfaces as `ConfigurationMissing` on the first cache operation.
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
        }
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self) -> SopResult<Arc<dyn KeyValueStore>> {
        let options = RedisOptions::parse(&self.connection)?;
        let store: Arc<dyn KeyValueStore> = Arc::new(RedisStore::connect(options).await?);
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_plain() {
        let options = RedisOptions::parse("cache:6380,defaultDatabase=4").unwrap();
        let url = connection_url(&options, &options.endpoints[0], options.database).unwrap();
        assert_eq!(url.as_str(), "redis://cache:6380/4");
    }

    #[test]
    fn test_connection_url_credentials_and_tls() {
        let options = RedisOptions::parse("cache:6379,user=app,password=p@ss,ssl=true").unwrap();
        let url = connection_url(&options, &options.endpoints[0], 2).unwrap();
        assert_eq!(url.scheme(), "rediss");
        assert_eq!(url.username(), "app");
        assert_eq!(url.password(), Some("p%40ss"));
        assert_eq!(url.path(), "/2");
    }

    fn array(items: Vec<Value>) -> Value {
        Value::Array(items)
    }

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_role_replies() {
        let master = array(vec![bulk("master"), Value::Int(3129659), array(vec![])]);
        let replica = array(vec![
            bulk("slave"),
            bulk("10.0.0.1"),
            Value::Int(6379),
            bulk("connected"),
            Value::Int(3129659),
        ]);
        let sentinel = array(vec![bulk("sentinel"), array(vec![bulk("mymaster")])]);

        assert_eq!(parse_role(&master), NodeRole::Master);
        assert_eq!(parse_role(&replica), NodeRole::Replica);
        assert_eq!(parse_role(&sentinel), NodeRole::Unknown);
        assert_eq!(parse_role(&Value::Nil), NodeRole::Unknown);
    }

    #[test]
    fn test_writes_go_to_master_whatever_the_order() {
        use NodeRole::{Master, Replica, Unknown};

        assert_eq!(pick_primary(&[Replica, Master]), Some(1));
        assert_eq!(pick_primary(&[Replica, Replica, Master]), Some(2));
        assert_eq!(pick_primary(&[Master, Replica]), Some(0));
        assert_eq!(pick_primary(&[Replica, Unknown, Master]), Some(2));
    }

    #[test]
    fn test_unknown_role_used_without_master() {
        use NodeRole::{Replica, Unknown};

        assert_eq!(pick_primary(&[Replica, Unknown]), Some(1));
        assert_eq!(pick_primary(&[Unknown]), Some(0));
    }

    #[test]
    fn test_replicas_only_have_no_primary() {
        assert_eq!(pick_primary(&[NodeRole::Replica, NodeRole::Replica]), None);
        assert_eq!(pick_primary(&[]), None);
    }

    #[tokio::test]
    async fn test_empty_connection_is_configuration_missing() {
        let connector = RedisConnector::new("");
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, SopError::ConfigurationMissing));
    }

    #[tokio::test]
    async fn test_unreachable_is_connection_failed() {
        // Port 1 on loopback refuses connections.
        let connector = RedisConnector::new("127.0.0.1:1,connectTimeout=500");
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, SopError::ConnectionFailed(_)), "got {:?}", err);
    }
}

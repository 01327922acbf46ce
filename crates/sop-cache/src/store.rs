//! Seam between the cache facade and the key-value store client.

use async_trait::async_trait;
use sop_config::Endpoint;
use sop_core::SopResult;
use std::sync::Arc;
use std::time::Duration;

/// Raw operations the facade needs from a key-value store.
///
/// Data commands (`get`, `set`, `exists`, `delete`) are routed by the store;
/// `scan` and `flush_db` address one endpoint explicitly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored bytes, or `None` if the key does not exist.
    async fn get(&self, key: &str) -> SopResult<Option<Vec<u8>>>;

    /// Stores bytes, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> SopResult<()>;

    /// Checks whether the key exists.
    async fn exists(&self, key: &str) -> SopResult<bool>;

    /// Deletes the key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> SopResult<bool>;

    /// Endpoints known to this store.
    fn endpoints(&self) -> Vec<Endpoint>;

    /// Lists the keys on `endpoint` matching a glob `pattern`.
    async fn scan(&self, endpoint: &Endpoint, pattern: &str) -> SopResult<Vec<String>>;

    /// Flushes a whole database on `endpoint`; the configured one when
    /// `database` is `None`.
    async fn flush_db(&self, endpoint: &Endpoint, database: Option<i64>) -> SopResult<()>;

    /// Whether administrative commands are permitted.
    fn allows_admin(&self) -> bool;

    /// Liveness check.
    async fn ping(&self) -> SopResult<()>;
}

/// Opens the store connection. Called once per [`CacheConnection`](crate::CacheConnection)
/// unless a previous attempt failed.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Establishes the connection.
    async fn connect(&self) -> SopResult<Arc<dyn KeyValueStore>>;
}

/// Turns a literal substring into a glob matching any key that contains it.
#[must_use]
pub fn contains_pattern(substring: &str) -> String {
    let mut pattern = String::with_capacity(substring.len() + 2);
    pattern.push('*');
    for c in substring.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Glob matching with the subset of Redis syntax produced by
/// [`contains_pattern`]: `*`, `?` and backslash escapes.
#[must_use]
pub fn glob_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() => {
                if pattern[p + 1] == text[t] {
                    p += 2;
                    t += 1;
                    continue;
                }
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

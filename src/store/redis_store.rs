//! Redis-backed key-value store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info, warn};

use super::KeyValueStore;
use crate::error::StoreError;

/// Keys fetched per `SCAN` round trip during [`RedisStore::clear_all`].
const SCAN_BATCH: usize = 500;

/// A [`KeyValueStore`] over a shared Redis instance.
///
/// Every key is namespaced as `<prefix>:<key>`, so `clear_all` only removes
/// the limiter's own keys even when the database is shared. The connection
/// manager reconnects on its own; failed commands are reported, not retried.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
    prefix: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisStore {
    /// Open a connection to `url` and namespace all keys under `prefix`.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection_manager = client.get_connection_manager().await?;

        info!(prefix = %prefix, "Connected to Redis");

        Ok(Self::from_connection_manager(connection_manager, prefix))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection_manager(connection_manager: ConnectionManager, prefix: &str) -> Self {
        Self {
            connection_manager,
            prefix: prefix.to_string(),
        }
    }

    /// The namespace prefix applied to every key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn conn(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }
}

fn unavailable<'a>(
    op: &'static str,
    key: &'a str,
) -> impl FnOnce(redis::RedisError) -> StoreError + 'a {
    move |err| {
        warn!(op, key, error = %err, "Redis command failed");
        StoreError::from(err)
    }
}

/// Escape Redis glob metacharacters so `value` only matches itself.
fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = self.namespaced(key);
        let mut conn = self.conn();
        let value: Option<String> = conn.get(&key).await.map_err(unavailable("GET", &key))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = self.namespaced(key);
        let mut conn = self.conn();
        let _: () = conn
            .set(&key, value)
            .await
            .map_err(unavailable("SET", &key))?;
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = self.namespaced(key);
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.conn();
        let _: () = conn
            .set_ex(&key, value, seconds)
            .await
            .map_err(unavailable("SETEX", &key))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let key = self.namespaced(key);
        let mut conn = self.conn();
        let exists: bool = conn
            .exists(&key)
            .await
            .map_err(unavailable("EXISTS", &key))?;
        Ok(exists)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let pattern = format!("{}:*", escape_glob(&self.prefix));
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(unavailable("SCAN", &pattern))?;

            if !keys.is_empty() {
                removed += keys.len();
                let _: () = conn
                    .del(keys)
                    .await
                    .map_err(unavailable("DEL", &pattern))?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix = %self.prefix, removed, "Cleared Redis namespace");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob_plain_prefix_unchanged() {
        assert_eq!(escape_glob("ratekeeper"), "ratekeeper");
    }

    #[test]
    fn test_escape_glob_metacharacters() {
        assert_eq!(escape_glob("rk*"), r"rk\*");
        assert_eq!(escape_glob("a?b"), r"a\?b");
        assert_eq!(escape_glob("[ab]"), r"\[ab\]");
        assert_eq!(escape_glob(r"a\b"), r"a\\b");
    }
}

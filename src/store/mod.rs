//! Key-value store boundary used by the rate limiter.
//!
//! The limiter only needs four primitive operations from its store. Each of
//! them can fail with [`StoreError::Unavailable`]; a missing key is always a
//! successful `None`/`false`, never an error. Implementations do not retry.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Trait for key-value stores holding rate limiting records.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Store `value` under `key` and drop it after `ttl`.
    ///
    /// Stores without expiry support keep the value until overwritten.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        self.set(key, value).await
    }

    /// Whether a value is currently stored under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every key owned by this store.
    async fn clear_all(&self) -> Result<(), StoreError>;
}

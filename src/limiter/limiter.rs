//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock};
use super::decision::{Decision, DenyPayload};
use super::quota::Quota;
use super::record::{CallerRecord, RecordKeys};
use crate::config::LimitsConfig;
use crate::error::LimiterError;
use crate::store::KeyValueStore;

/// Value written under the presence key of a record.
const PRESENCE_MARKER: &str = "1";

/// Settings shared by every check made through one limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterOptions {
    /// Recorded on every seeded record
    pub domain: String,
    /// Recorded on every seeded record
    pub origin: String,
    /// Serialize concurrent checks for the same identifier
    pub serialize_per_identifier: bool,
    /// Let the store drop records once their window has closed
    pub expire_records: bool,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for LimiterOptions {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            origin: config.origin.clone(),
            serialize_per_identifier: config.serialize_per_identifier,
            expire_records: config.expire_records,
        }
    }
}

/// Per-caller request counter kept in a shared key-value store.
///
/// Each check is a read-modify-write over several independent store keys and
/// is not atomic. Two concurrent checks for the same identifier can both be
/// allowed past the limit unless `serialize_per_identifier` is on, which only
/// protects checks running inside this process.
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    options: LimiterOptions,
    /// In-flight per-identifier guards, only used when serializing
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RateLimiter {
    /// Create a rate limiter over `store` using the wall clock.
    pub fn new(store: Arc<dyn KeyValueStore>, options: LimiterOptions) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            options,
            locks: DashMap::new(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &LimiterOptions {
        &self.options
    }

    /// Count one request from `identifier` and decide whether it may proceed.
    ///
    /// Any store failure aborts the check with [`LimiterError::Unavailable`];
    /// it is never turned into an allow or a deny.
    pub async fn check_and_record(
        &self,
        identifier: &str,
        quota: &Quota,
    ) -> Result<Decision, LimiterError> {
        if !self.options.serialize_per_identifier {
            return self.decide(identifier, quota).await;
        }

        let lock = self.locks.entry(identifier.to_string()).or_default().clone();
        let decision = {
            let _guard = lock.lock().await;
            self.decide(identifier, quota).await
        };
        drop(lock);
        self.locks
            .remove_if(identifier, |_, lock| Arc::strong_count(lock) == 1);

        decision
    }

    async fn decide(&self, identifier: &str, quota: &Quota) -> Result<Decision, LimiterError> {
        let keys = RecordKeys::new(identifier);
        let now = self.clock.now();

        trace!(
            identifier = %identifier,
            max_requests = quota.max_requests(),
            window_seconds = quota.window_seconds(),
            "Checking rate limit"
        );

        if !self.store.exists(&keys.presence).await? {
            debug!(identifier = %identifier, "No record for caller, seeding");
            return self.seed(&keys, quota, now).await;
        }

        let last_request_at = self
            .store
            .get(&keys.last_request_at)
            .await?
            .and_then(|v| v.parse::<i64>().ok());
        let request_count = self
            .store
            .get(&keys.request_count)
            .await?
            .and_then(|v| v.parse::<u64>().ok());

        let (last_request_at, request_count) = match (last_request_at, request_count) {
            (Some(last), Some(count)) => (last, count),
            _ => {
                warn!(
                    identifier = %identifier,
                    "Caller record is incomplete, reseeding"
                );
                return self.seed(&keys, quota, now).await;
            }
        };

        let window = quota.window_seconds() as i64;
        if last_request_at <= now.saturating_sub(window) {
            debug!(
                identifier = %identifier,
                last_request_at,
                "Window elapsed, reseeding"
            );
            return self.seed(&keys, quota, now).await;
        }

        let remaining = window_remaining(last_request_at, window, now);
        let new_count = request_count.saturating_add(1);
        self.write(&keys.request_count, &new_count.to_string(), remaining)
            .await?;

        if request_count < quota.max_requests() {
            return Ok(Decision::Allow {
                request_count: new_count,
            });
        }

        let domain = self.store.get(&keys.domain).await?.unwrap_or_default();

        debug!(
            identifier = %identifier,
            count = new_count,
            limit = quota.max_requests(),
            "Rate limit exceeded"
        );

        Ok(Decision::Deny {
            payload: DenyPayload::new(identifier, quota, last_request_at, new_count, &domain),
            retry_after: remaining,
        })
    }

    /// Write a fresh record. Fields go first so the presence key never
    /// points at a record with no fields.
    async fn seed(
        &self,
        keys: &RecordKeys,
        quota: &Quota,
        now: i64,
    ) -> Result<Decision, LimiterError> {
        let ttl = quota.window();
        self.write(&keys.domain, &self.options.domain, ttl).await?;
        self.write(&keys.origin, &self.options.origin, ttl).await?;
        self.write(&keys.last_request_at, &now.to_string(), ttl)
            .await?;
        self.write(&keys.request_count, "1", ttl).await?;
        self.write(&keys.presence, PRESENCE_MARKER, ttl).await?;

        Ok(Decision::Allow { request_count: 1 })
    }

    async fn write(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LimiterError> {
        if self.options.expire_records {
            self.store.set_with_expiry(key, value, ttl).await?;
        } else {
            self.store.set(key, value).await?;
        }
        Ok(())
    }

    /// Read the stored record for `identifier`, if it is complete.
    pub async fn record(&self, identifier: &str) -> Result<Option<CallerRecord>, LimiterError> {
        let keys = RecordKeys::new(identifier);

        if !self.store.exists(&keys.presence).await? {
            return Ok(None);
        }

        let domain = self.store.get(&keys.domain).await?;
        let origin = self.store.get(&keys.origin).await?;
        let last_request_at = self
            .store
            .get(&keys.last_request_at)
            .await?
            .and_then(|v| v.parse().ok());
        let request_count = self
            .store
            .get(&keys.request_count)
            .await?
            .and_then(|v| v.parse().ok());

        Ok(match (domain, origin, last_request_at, request_count) {
            (Some(domain), Some(origin), Some(last_request_at), Some(request_count)) => {
                Some(CallerRecord {
                    domain,
                    origin,
                    last_request_at,
                    request_count,
                })
            }
            _ => None,
        })
    }

    /// Wipe every caller record. Administrative reset only.
    pub async fn clear_all(&self) -> Result<(), LimiterError> {
        warn!("Clearing all rate limiting records");
        self.store.clear_all().await?;
        Ok(())
    }
}

/// Time left in a window opened at `last_request_at`, at least one second.
fn window_remaining(last_request_at: i64, window: i64, now: i64) -> Duration {
    let remaining = last_request_at.saturating_add(window).saturating_sub(now);
    Duration::from_secs(remaining.max(1) as u64)
}

//! Configuration management for Ratekeeper.
//!
//! Configuration is layered: serde defaults, then an optional YAML/TOML/JSON
//! file, then `RATEKEEPER__<SECTION>__<FIELD>` environment variables.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{RatekeeperError, Result};
use crate::limiter::Quota;

/// Main configuration for the Ratekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Key-value store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Which store implementation backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis instance
    Redis,
    /// Process-local map; only meaningful for a single instance
    Memory,
}

/// Key-value store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Redis connection URL, including credentials if any
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Namespace prepended to every key written by the limiter
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "ratekeeper".to_string()
}

/// What the host does when the limiter cannot reach its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let the request through and flag the response as degraded
    FailOpen,
    /// Reject the request with an `UNAVAILABLE` status
    FailClosed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Requests allowed per window when the caller does not override it
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window length in seconds when the caller does not override it
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Service/host name recorded on every caller record
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Provenance tag recorded on every caller record
    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default = "default_failure_policy")]
    pub failure_policy: FailurePolicy,

    /// Serialize concurrent checks for the same identifier inside this process
    #[serde(default)]
    pub serialize_per_identifier: bool,

    /// Attach a TTL matching the remaining window to every record write
    #[serde(default)]
    pub expire_records: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            domain: default_domain(),
            origin: default_origin(),
            failure_policy: default_failure_policy(),
            serialize_per_identifier: false,
            expire_records: false,
        }
    }
}

fn default_max_requests() -> u64 {
    60
}

fn default_window_seconds() -> u64 {
    Quota::DEFAULT_WINDOW_SECONDS
}

fn default_domain() -> String {
    "localhost".to_string()
}

fn default_origin() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::FailClosed
}

impl LimitsConfig {
    /// The configured default quota.
    pub fn quota(&self) -> Result<Quota> {
        Quota::new(self.max_requests, self.window_seconds)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl RatekeeperConfig {
    /// Load configuration from an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path));
        }

        let config: RatekeeperConfig = builder
            .add_source(
                config::Environment::with_prefix("RATEKEEPER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RatekeeperConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RatekeeperError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.limits.quota()?;

        if self.store.key_prefix.is_empty() {
            return Err(RatekeeperError::Config(
                "store.key_prefix must not be empty".to_string(),
            ));
        }

        if self
            .store
            .key_prefix
            .contains(['*', '?', '[', ']', '\\', ':'])
        {
            return Err(RatekeeperError::Config(format!(
                "store.key_prefix must not contain glob characters or ':': {}",
                self.store.key_prefix
            )));
        }

        Ok(())
    }
}

//! Error types for the Ratekeeper service.

use thiserror::Error;

/// Errors reported by a [`KeyValueStore`](crate::store::KeyValueStore).
///
/// A missing key is never an error; it is reported as `Ok(None)` or `Ok(false)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or answered with a protocol error.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Errors reported by the [`RateLimiter`](crate::limiter::RateLimiter).
///
/// A denial is not an error; see [`Decision`](crate::limiter::Decision).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// The store failed while a decision was being made.
    #[error("Rate limiter unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

/// Main error type for Ratekeeper operations.
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value store errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rate limiter errors
    #[error(transparent)]
    Limiter(#[from] LimiterError),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for RatekeeperError {
    fn from(err: config::ConfigError) -> Self {
        RatekeeperError::Config(err.to_string())
    }
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;

//! Request quota: how many requests fit in how long a window.

use std::time::Duration;

use crate::error::{RatekeeperError, Result};

/// Maximum number of requests a caller may make per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    max_requests: u64,
    window_seconds: u64,
}

impl Quota {
    /// Window length used when none is specified.
    pub const DEFAULT_WINDOW_SECONDS: u64 = 1;

    /// Create a quota. Both values must be positive.
    pub fn new(max_requests: u64, window_seconds: u64) -> Result<Self> {
        if max_requests == 0 {
            return Err(RatekeeperError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_seconds == 0 {
            return Err(RatekeeperError::Config(
                "window_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window_seconds,
        })
    }

    /// A quota over the default one second window.
    pub fn per_second(max_requests: u64) -> Result<Self> {
        Self::new(max_requests, Self::DEFAULT_WINDOW_SECONDS)
    }

    /// Replace either value with a per-call override; zero keeps the current value.
    pub fn with_overrides(&self, max_requests: u64, window_seconds: u64) -> Self {
        Self {
            max_requests: if max_requests == 0 {
                self.max_requests
            } else {
                max_requests
            },
            window_seconds: if window_seconds == 0 {
                self.window_seconds
            } else {
                window_seconds
            },
        }
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_rejects_zero() {
        assert!(Quota::new(0, 10).is_err());
        assert!(Quota::new(10, 0).is_err());
        assert!(Quota::new(1, 1).is_ok());
    }

    #[test]
    fn test_default_window() {
        let quota = Quota::per_second(5).unwrap();
        assert_eq!(quota.window(), Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let quota = Quota::new(10, 60).unwrap();

        assert_eq!(quota.with_overrides(0, 0), quota);
        assert_eq!(quota.with_overrides(3, 0), Quota::new(3, 60).unwrap());
        assert_eq!(quota.with_overrides(0, 5), Quota::new(10, 5).unwrap());
    }
}

//! Outcome of a rate limit check.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::clock::format_timestamp;
use super::quota::Quota;

/// Result of counting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allow {
        /// Requests counted in the current window, this one included
        request_count: u64,
    },
    /// The caller is over its quota.
    Deny {
        payload: DenyPayload,
        /// Time until the current window closes
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Requests counted in the current window, this one included.
    pub fn request_count(&self) -> u64 {
        match self {
            Decision::Allow { request_count } => *request_count,
            Decision::Deny { payload, .. } => payload.additional_info.request_count,
        }
    }
}

/// Diagnostic body returned to a denied caller.
///
/// Serializes to the JSON contract:
/// `{"status":"error","message":..,"additional_info":{"identifier":..,
/// "last_request_at":..,"qtdReq":..,"domain":..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyPayload {
    pub status: String,
    pub message: String,
    pub additional_info: AdditionalInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    pub identifier: String,
    /// `YYYY-MM-DD HH:MM:SS`, UTC
    pub last_request_at: String,
    #[serde(rename = "qtdReq")]
    pub request_count: u64,
    pub domain: String,
}

impl DenyPayload {
    pub fn new(
        identifier: &str,
        quota: &Quota,
        last_request_at: i64,
        request_count: u64,
        domain: &str,
    ) -> Self {
        Self {
            status: "error".to_string(),
            message: format!(
                "Too many requests: the limit is {} requests every {} seconds",
                quota.max_requests(),
                quota.window_seconds()
            ),
            additional_info: AdditionalInfo {
                identifier: identifier.to_string(),
                last_request_at: format_timestamp(last_request_at),
                request_count,
                domain: domain.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::parse_timestamp;

    #[test]
    fn test_deny_payload_json_shape() {
        let quota = Quota::new(3, 60).unwrap();
        let payload = DenyPayload::new("9.9.9.9", &quota, 0, 4, "api.example.com");

        let value: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(
            value["message"],
            "Too many requests: the limit is 3 requests every 60 seconds"
        );
        assert_eq!(value["additional_info"]["identifier"], "9.9.9.9");
        assert_eq!(value["additional_info"]["last_request_at"], "1970-01-01 00:00:00");
        assert_eq!(value["additional_info"]["qtdReq"], 4);
        assert_eq!(value["additional_info"]["domain"], "api.example.com");
    }

    #[test]
    fn test_payload_timestamp_parses_back() {
        let quota = Quota::per_second(1).unwrap();
        let payload = DenyPayload::new("a", &quota, 1_700_000_123, 2, "d");
        assert_eq!(
            parse_timestamp(&payload.additional_info.last_request_at),
            Some(1_700_000_123)
        );
    }

    #[test]
    fn test_decision_request_count() {
        let allow = Decision::Allow { request_count: 2 };
        assert!(allow.is_allowed());
        assert_eq!(allow.request_count(), 2);

        let quota = Quota::per_second(1).unwrap();
        let deny = Decision::Deny {
            payload: DenyPayload::new("a", &quota, 0, 7, "d"),
            retry_after: Duration::from_secs(1),
        };
        assert!(!deny.is_allowed());
        assert_eq!(deny.request_count(), 7);
    }
}

//! Caller identifier resolution from request metadata.

use tracing::trace;

/// Direct peer address reported for local IPv6 connections.
const IPV6_LOOPBACK: &str = "::1";
/// Placeholder used in its place.
const LOOPBACK_PLACEHOLDER: &str = "127.0.0.1";

/// Address-related metadata of an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Client-supplied proxy header (e.g. `Client-IP`)
    pub client_ip: Option<String>,
    /// Raw `X-Forwarded-For` header
    pub forwarded_for: Option<String>,
    /// Address of the direct connection
    pub remote_addr: Option<String>,
}

impl RequestMetadata {
    /// Resolve the best-effort caller identifier.
    ///
    /// Prefers the proxy header, then the first entry of the forwarded-for
    /// list, then the direct address. Returns `None` when none is usable.
    pub fn resolve_identifier(&self) -> Option<String> {
        let identifier = non_empty(self.client_ip.as_deref())
            .or_else(|| {
                self.forwarded_for
                    .as_deref()
                    .and_then(|list| list.split(',').find_map(|ip| non_empty(Some(ip))))
            })
            .or_else(|| {
                non_empty(self.remote_addr.as_deref()).map(|addr| {
                    if addr == IPV6_LOOPBACK {
                        LOOPBACK_PLACEHOLDER
                    } else {
                        addr
                    }
                })
            })
            .map(str::to_string);

        trace!(metadata = ?self, identifier = ?identifier, "Resolved caller identifier");
        identifier
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(client_ip: &str, forwarded_for: &str, remote_addr: &str) -> RequestMetadata {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RequestMetadata {
            client_ip: opt(client_ip),
            forwarded_for: opt(forwarded_for),
            remote_addr: opt(remote_addr),
        }
    }

    #[test]
    fn test_proxy_header_wins() {
        let meta = metadata("203.0.113.5", "198.51.100.7", "10.0.0.1");
        assert_eq!(meta.resolve_identifier(), Some("203.0.113.5".to_string()));
    }

    #[test]
    fn test_forwarded_for_before_remote() {
        let meta = metadata("", "198.51.100.7, 10.1.1.1", "10.0.0.1");
        assert_eq!(meta.resolve_identifier(), Some("198.51.100.7".to_string()));
    }

    #[test]
    fn test_forwarded_for_skips_empty_entries() {
        let meta = metadata("", " , 198.51.100.7", "10.0.0.1");
        assert_eq!(meta.resolve_identifier(), Some("198.51.100.7".to_string()));
    }

    #[test]
    fn test_remote_addr_fallback() {
        let meta = metadata("", "", "10.0.0.1");
        assert_eq!(meta.resolve_identifier(), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn test_ipv6_loopback_placeholder() {
        let meta = metadata("", "", "::1");
        assert_eq!(meta.resolve_identifier(), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_loopback_placeholder_only_for_direct_address() {
        let meta = metadata("::1", "", "10.0.0.1");
        assert_eq!(meta.resolve_identifier(), Some("::1".to_string()));
    }

    #[test]
    fn test_blank_values_are_absent() {
        let meta = RequestMetadata {
            client_ip: Some("   ".to_string()),
            forwarded_for: Some("".to_string()),
            remote_addr: Some("10.0.0.1".to_string()),
        };
        assert_eq!(meta.resolve_identifier(), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn test_nothing_to_resolve() {
        assert_eq!(RequestMetadata::default().resolve_identifier(), None);
    }
}

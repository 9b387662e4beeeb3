//! Per-caller record model and its key layout.

/// State kept for a single caller identifier.
///
/// Each field lives under its own key, so readers may observe a record that
/// is only partially written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerRecord {
    /// Service or host the caller is hitting
    pub domain: String,
    /// Provenance tag of the limiter instance that seeded the record
    pub origin: String,
    /// Unix time of the request that started the current window
    pub last_request_at: i64,
    /// Requests counted in the current window, denied ones included
    pub request_count: u64,
}

/// Store keys making up one caller record.
///
/// Every key is `<escaped identifier>:<field>`, presence included. Escaping
/// turns `\` into `\\` and `:` into `\:`, so the escaped identifier never
/// holds a bare `:` and no identifier can produce another one's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordKeys {
    pub presence: String,
    pub domain: String,
    pub origin: String,
    pub last_request_at: String,
    pub request_count: String,
}

impl RecordKeys {
    pub(crate) fn new(identifier: &str) -> Self {
        let id = escape_identifier(identifier);
        Self {
            presence: format!("{}:present", id),
            domain: format!("{}:domain", id),
            origin: format!("{}:origin", id),
            last_request_at: format!("{}:last_request_at", id),
            request_count: format!("{}:request_count", id),
        }
    }
}

fn escape_identifier(identifier: &str) -> String {
    let mut escaped = String::with_capacity(identifier.len());
    for c in identifier.chars() {
        if c == '\\' || c == ':' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keys() {
        let keys = RecordKeys::new("9.9.9.9");
        assert_eq!(keys.presence, "9.9.9.9:present");
        assert_eq!(keys.domain, "9.9.9.9:domain");
        assert_eq!(keys.origin, "9.9.9.9:origin");
        assert_eq!(keys.last_request_at, "9.9.9.9:last_request_at");
        assert_eq!(keys.request_count, "9.9.9.9:request_count");
    }

    #[test]
    fn test_ipv6_identifier_is_escaped() {
        let keys = RecordKeys::new("2001:db8::1");
        assert_eq!(keys.presence, r"2001\:db8\:\:1:present");
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("a:b"), r"a\:b");
        assert_eq!(escape_identifier(r"a\b"), r"a\\b");
        assert_eq!(escape_identifier(r"a\:b"), r"a\\\:b");
    }

    #[test]
    fn test_suffixed_identifier_shares_no_keys() {
        let a = RecordKeys::new("a");
        let b = RecordKeys::new("a:request_count");
        let b_escaped = RecordKeys::new(r"a\:request_count");

        let keys = |k: &RecordKeys| {
            vec![
                k.presence.clone(),
                k.domain.clone(),
                k.origin.clone(),
                k.last_request_at.clone(),
                k.request_count.clone(),
            ]
        };
        for other in [&b, &b_escaped] {
            for key in keys(other) {
                assert!(!keys(&a).contains(&key), "{} collides", key);
            }
        }
        for key in keys(&b) {
            assert!(!keys(&b_escaped).contains(&key), "{} collides", key);
        }
    }
}

//! Derives a stable consumer identifier from request headers.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// A user-supplied override for consumer-ID derivation. Takes the same
/// lowercased-header-name mapping as the default policy and returns the
/// same `Option<String>` shape; its result is used unmodified (subject to
/// later truncation in the sanitizer).
pub type IdentifyConsumerFn = Arc<dyn Fn(&HashMap<String, String>) -> Option<String> + Send + Sync>;

/// Default consumer identification policy:
/// 1. `x-api-key`, if present and non-empty, verbatim.
/// 2. Else `authorization`, if present and non-empty, hashed.
/// 3. Else absent.
pub fn identify_consumer(headers: &HashMap<String, String>) -> Option<String> {
    if let Some(key) = headers.get("x-api-key") {
        if !key.is_empty() {
            return Some(key.clone());
        }
    }

    if let Some(auth) = headers.get("authorization") {
        if !auth.is_empty() {
            return Some(hash_consumer_value(auth));
        }
    }

    None
}

/// `"hash_" + first 12 hex digits of SHA-256(value)`.
fn hash_consumer_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    format!("hash_{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn api_key_wins_verbatim() {
        let h = headers(&[("x-api-key", "ak_live_abc123")]);
        assert_eq!(identify_consumer(&h), Some("ak_live_abc123".to_string()));
    }

    #[test]
    fn api_key_wins_over_authorization() {
        let h = headers(&[("x-api-key", "ak_live_abc123"), ("authorization", "Bearer token")]);
        assert_eq!(identify_consumer(&h), Some("ak_live_abc123".to_string()));
    }

    #[test]
    fn authorization_is_hashed() {
        let h = headers(&[("authorization", "Bearer secret-token")]);
        let id = identify_consumer(&h).expect("should identify");
        assert_eq!(id.len(), 17);
        assert!(id.starts_with("hash_"));
        assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn empty_api_key_falls_through_to_authorization() {
        let h = headers(&[("x-api-key", ""), ("authorization", "Bearer x")]);
        let id = identify_consumer(&h).expect("should identify");
        assert!(id.starts_with("hash_"));
    }

    #[test]
    fn empty_headers_yield_none() {
        assert_eq!(identify_consumer(&HashMap::new()), None);
    }

    #[test]
    fn hashing_is_deterministic() {
        let h = headers(&[("authorization", "Bearer secret-token")]);
        assert_eq!(identify_consumer(&h), identify_consumer(&h));
    }
}

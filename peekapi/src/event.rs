//! Coerces and truncates a submitted event to the wire schema, enforcing
//! the per-event byte ceiling. See [`sanitize_event`].

use chrono::Utc;
use serde_json::{Map, Value};

const METHOD_MAX_BYTES: usize = 16;
const PATH_MAX_BYTES: usize = 2048;
const CONSUMER_ID_MAX_BYTES: usize = 256;

/// A sanitized event, ready to be admitted into the buffer or serialized
/// for the wire.
pub type Event = Map<String, Value>;

/// Sanitizes a caller-submitted event.
///
/// Returns `None` (and the caller should emit an [`crate::error::Diagnostic::Oversized`])
/// when the event is still over `max_event_bytes` after stripping
/// `metadata`, or when the input cannot be coerced into a mapping at all
/// (malformed input is silently dropped, never a panic).
pub fn sanitize_event(input: Value, max_event_bytes: usize) -> Result<Event, SanitizeError> {
    let mut map = match input {
        Value::Object(map) => map,
        _ => return Err(SanitizeError::NotAMapping),
    };

    if let Some(method) = map.get("method").and_then(Value::as_str) {
        let upper = method.to_uppercase();
        let truncated = truncate_str(&upper, METHOD_MAX_BYTES);
        map.insert("method".to_string(), Value::String(truncated));
    }

    if let Some(path) = map.get("path").and_then(Value::as_str) {
        let truncated = truncate_str(path, PATH_MAX_BYTES);
        map.insert("path".to_string(), Value::String(truncated));
    }

    if let Some(consumer_id) = map.get("consumer_id").and_then(Value::as_str) {
        let truncated = truncate_str(consumer_id, CONSUMER_ID_MAX_BYTES);
        map.insert("consumer_id".to_string(), Value::String(truncated));
    }

    if !map.contains_key("timestamp") {
        map.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
        );
    }

    let byte_len = serialized_len(&map);
    if byte_len <= max_event_bytes {
        return Ok(map);
    }

    map.remove("metadata");
    let byte_len = serialized_len(&map);
    if byte_len <= max_event_bytes {
        return Ok(map);
    }

    Err(SanitizeError::Oversized {
        byte_len,
        limit: max_event_bytes,
    })
}

/// Truncates `s` to at most `max_bytes` bytes, respecting UTF-8 char
/// boundaries (never splitting a multi-byte codepoint).
fn truncate_str(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn serialized_len(map: &Event) -> usize {
    serde_json::to_vec(map).map(|v| v.len()).unwrap_or(usize::MAX)
}

/// Joins pre-sorted query parameters onto `path` the way `collect_query_string`
/// requires: a `?`-joined, lexicographically sorted `key=value` list.
pub fn append_sorted_query_string(path: &str, query: &std::collections::BTreeMap<String, String>) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let joined = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{joined}")
}

#[derive(Debug)]
pub enum SanitizeError {
    NotAMapping,
    Oversized { byte_len: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_uppercased_and_truncated() {
        let evt = sanitize_event(json!({"method": "get"}), 64 * 1024).unwrap();
        assert_eq!(evt["method"], "GET");
    }

    #[test]
    fn method_truncates_to_16_bytes() {
        let long = "a".repeat(32);
        let evt = sanitize_event(json!({"method": long}), 64 * 1024).unwrap();
        assert_eq!(evt["method"].as_str().unwrap().len(), 16);
    }

    #[test]
    fn path_truncates_to_2048_bytes() {
        let long = "/".to_string() + &"x".repeat(3000);
        let evt = sanitize_event(json!({"path": long}), 64 * 1024).unwrap();
        assert!(evt["path"].as_str().unwrap().len() <= 2048);
    }

    #[test]
    fn consumer_id_truncates_to_256_bytes() {
        let long = "c".repeat(300);
        let evt = sanitize_event(json!({"consumer_id": long}), 64 * 1024).unwrap();
        assert!(evt["consumer_id"].as_str().unwrap().len() <= 256);
    }

    #[test]
    fn timestamp_filled_when_absent() {
        let evt = sanitize_event(json!({"method": "GET"}), 64 * 1024).unwrap();
        assert!(evt["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn timestamp_preserved_when_present() {
        let evt = sanitize_event(json!({"timestamp": "2020-01-01T00:00:00.000Z"}), 64 * 1024).unwrap();
        assert_eq!(evt["timestamp"], "2020-01-01T00:00:00.000Z");
    }

    #[test]
    fn metadata_stripped_under_size_pressure() {
        let big_metadata = "m".repeat(1000);
        let evt = json!({"method": "GET", "metadata": {"blob": big_metadata}});
        let sanitized = sanitize_event(evt, 100).unwrap();
        assert!(!sanitized.contains_key("metadata"));
    }

    #[test]
    fn still_oversized_after_stripping_metadata_is_dropped() {
        let evt = json!({"path": "x".repeat(500)});
        let result = sanitize_event(evt, 50);
        assert!(matches!(result, Err(SanitizeError::Oversized { .. })));
    }

    #[test]
    fn non_mapping_is_dropped() {
        let result = sanitize_event(json!("just a string"), 64 * 1024);
        assert!(matches!(result, Err(SanitizeError::NotAMapping)));
    }

    #[test]
    fn query_string_sorted_and_joined() {
        let mut q = std::collections::BTreeMap::new();
        q.insert("b".to_string(), "2".to_string());
        q.insert("a".to_string(), "1".to_string());
        assert_eq!(append_sorted_query_string("/p", &q), "/p?a=1&b=2");
    }
}

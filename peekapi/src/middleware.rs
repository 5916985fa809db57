//! The middleware-to-core contract.
//!
//! The web-framework middleware itself, extracting per-request fields
//! from a request/response pair and calling `crate::Client::track`, is
//! an external collaborator, out of scope for this crate. This module
//! only captures the shape of the event it must produce, so a middleware
//! implementation has a typed target to build against and this crate can
//! exercise the contract in its own tests.

use std::collections::BTreeMap;

use serde_json::{json, Value};

/// Per-request fields the middleware is expected to supply to `track`.
#[derive(Debug, Clone)]
pub struct RequestFields {
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub response_time_ms: f64,
    pub request_size: u64,
    pub response_size: u64,
    pub consumer_id: Option<String>,
    /// Query parameters to append to `path` when the client's
    /// `collect_query_string` is enabled. Empty if the request had none.
    pub query: BTreeMap<String, String>,
}

impl RequestFields {
    /// The fallback event a middleware must still produce when an
    /// application exception propagates through it: `status_code = 500`,
    /// `response_size = 0`, before re-raising.
    pub fn for_propagated_exception(method: &str, path: &str, response_time_ms: f64, request_size: u64) -> RequestFields {
        RequestFields {
            method: method.to_string(),
            path: path.to_string(),
            status_code: 500,
            response_time_ms,
            request_size,
            response_size: 0,
            consumer_id: None,
            query: BTreeMap::new(),
        }
    }

    /// Serializes to the wire-shaped mapping `track` expects. Sanitization
    /// (truncation, timestamp fill-in) still happens inside `track`/the
    /// sanitizer; this only assembles the recognized keys. `path` carries
    /// the sorted query string appended when `collect_query_string` is on,
    /// via the same helper `Client::request_path` uses.
    pub fn to_event(&self, collect_query_string: bool) -> Value {
        let path = if collect_query_string {
            crate::event::append_sorted_query_string(&self.path, &self.query)
        } else {
            self.path.clone()
        };

        let mut event = json!({
            "method": self.method,
            "path": path,
            "status_code": self.status_code,
            "response_time_ms": round_two_decimals(self.response_time_ms),
            "request_size": self.request_size,
            "response_size": self.response_size,
        });

        if let Some(consumer_id) = &self.consumer_id {
            event["consumer_id"] = Value::String(consumer_id.clone());
        }

        event
    }
}

fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

//! In-process analytics ingest client.
//!
//! Observes HTTP requests flowing through a host web application (via an
//! external middleware collaborator, see [`middleware`]) and reliably
//! delivers per-request telemetry to a remote ingestion endpoint. The
//! client never blocks or crashes the host: [`Client::track`] only
//! sanitizes and admits an event into a bounded in-memory buffer; a
//! single background worker owns all network and (mostly) disk I/O,
//! retrying with backoff and falling back to an on-disk overflow log when
//! the remote is unreachable.
//!
//! ```no_run
//! let client = peekapi::Client::new(
//!     peekapi::ClientConfig::builder()
//!         .api_key("ak_live_...".to_string())
//!         .build()
//!         .unwrap(),
//! ).unwrap();
//!
//! client.track(serde_json::json!({
//!     "method": "GET",
//!     "path": "/api/users",
//!     "status_code": 200,
//! }));
//!
//! client.shutdown();
//! ```

mod address;
mod buffer;
mod client;
mod config;
mod consumer;
mod disk;
mod endpoint;
mod env;
mod error;
mod event;
mod http_sender;
pub mod middleware;
mod scheduler;
mod signal;

pub use address::is_private_host;
pub use client::Client;
pub use config::{ClientConfig, ClientConfigBuilder, OnError};
pub use consumer::{identify_consumer, IdentifyConsumerFn};
pub use endpoint::validate_endpoint;
pub use env::{from_env, ShutdownGuard, API_KEY_ENV_VAR, ENDPOINT_ENV_VAR};
pub use error::{Diagnostic, Error};

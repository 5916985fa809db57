//! Client configuration, assembled with a builder: fields get their
//! documented defaults here, while validation of `api_key` and
//! `endpoint` happens afterward, in [`crate::Client::new`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::consumer::IdentifyConsumerFn;
use crate::error::Diagnostic;

pub(crate) const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 15;
pub(crate) const DEFAULT_BATCH_SIZE: usize = 250;
pub(crate) const DEFAULT_MAX_BUFFER_SIZE: usize = 10_000;
pub(crate) const DEFAULT_MAX_STORAGE_BYTES: u64 = 5 * 1024 * 1024;
pub(crate) const DEFAULT_MAX_EVENT_BYTES: usize = 64 * 1024;
pub(crate) const DEFAULT_ENDPOINT: &str = "https://ingest.peekapi.com/v1/events";

/// An `on_error` callback, invoked with each surfaced post-construction
/// failure. A panic inside it is caught and swallowed rather than taking
/// down the flush worker.
pub type OnError = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

#[derive(derive_builder::Builder)]
pub struct ClientConfig {
    /// Credential forwarded as the `x-api-key` header. Must not contain
    /// control bytes `0x00-0x1F` or `0x7F`.
    pub api_key: String,

    /// Validated ingest URL.
    #[builder(default = "DEFAULT_ENDPOINT.to_string()")]
    pub endpoint: String,

    /// Maximum seconds between flushes.
    #[builder(default = "Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS)")]
    pub flush_interval: Duration,

    /// Max events per POST; also the fill-trigger threshold.
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    pub batch_size: usize,

    /// Hard cap on in-memory events.
    #[builder(default = "DEFAULT_MAX_BUFFER_SIZE")]
    pub max_buffer_size: usize,

    /// Hard cap on on-disk overflow, in bytes.
    #[builder(default = "DEFAULT_MAX_STORAGE_BYTES")]
    pub max_storage_bytes: u64,

    /// Per-event serialized byte ceiling.
    #[builder(default = "DEFAULT_MAX_EVENT_BYTES")]
    pub max_event_bytes: usize,

    /// Overflow file location. Defaults to `<tmpdir>/peekapi-events-<hash>.jsonl`.
    #[builder(default, setter(strip_option))]
    pub storage_path: Option<PathBuf>,

    /// Override for consumer-ID derivation.
    #[builder(default, setter(strip_option))]
    pub identify_consumer: Option<IdentifyConsumerFn>,

    /// Include a sorted query string in `path`.
    #[builder(default = "false")]
    pub collect_query_string: bool,

    /// Callback invoked with each surfaced failure.
    #[builder(default, setter(strip_option))]
    pub on_error: Option<OnError>,

    /// Emit diagnostic lines to stderr.
    #[builder(default = "false")]
    pub debug: bool,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = ClientConfig::builder().api_key("k".into()).build().unwrap();
        assert_eq!(config.flush_interval, Duration::from_secs(15));
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.max_buffer_size, 10_000);
        assert_eq!(config.max_storage_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_event_bytes, 64 * 1024);
        assert!(!config.collect_query_string);
        assert!(!config.debug);
    }
}

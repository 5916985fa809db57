//! Construction, signal wiring, and graceful/forced shutdown paths for
//! the ingest client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::buffer::{BoundedBuffer, WakeToken};
use crate::config::ClientConfig;
use crate::consumer::identify_consumer;
use crate::disk::DiskStore;
use crate::endpoint::validate_endpoint;
use crate::error::{Diagnostic, Error};
use crate::event::sanitize_event;
use crate::http_sender::HttpSender;
use crate::scheduler::{self, FlushScheduler, SchedulerDeps};
use crate::signal;

const SDK_HEADER_NAME: &str = "x-peekapi-sdk";
const SDK_LANGUAGE: &str = "rust";

/// Control characters rejected in `api_key`: 0x00-0x1F and 0x7F.
fn has_control_bytes(s: &str) -> bool {
    s.bytes().any(|b| b <= 0x1f || b == 0x7f)
}

/// The analytics ingest client. Cheaply cloneable; every clone shares the
/// same buffer, disk store, and background worker.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config_endpoint: String,
    config_max_event_bytes: usize,
    config_max_storage_bytes: u64,
    config_collect_query_string: bool,
    identify_consumer_override: Option<crate::consumer::IdentifyConsumerFn>,
    buffer: Arc<BoundedBuffer>,
    disk: Arc<DiskStore>,
    deps: SchedulerDeps,
    scheduler: Mutex<Option<FlushScheduler>>,
    shutting_down: AtomicBool,
    signal_guard: Mutex<Option<signal::SignalGuard>>,
}

impl Client {
    /// Validates `config` and starts the background worker. Construction
    /// errors (missing/invalid `api_key`, any `EndpointValidator`
    /// rejection) surface synchronously here.
    pub fn new(config: ClientConfig) -> Result<Client, Error> {
        if config.api_key.is_empty() {
            return Err(Error::invalid("api_key is required"));
        }
        if has_control_bytes(&config.api_key) {
            return Err(Error::invalid("api_key must not contain control characters"));
        }

        let endpoint = validate_endpoint(&config.endpoint)?;

        let storage_path = config
            .storage_path
            .clone()
            .unwrap_or_else(|| crate::disk::default_storage_path(&endpoint));

        let (buffer, wake_rx) = BoundedBuffer::new(config.max_buffer_size, config.batch_size);
        let buffer = Arc::new(buffer);
        let disk = Arc::new(DiskStore::new(storage_path, config.max_storage_bytes));
        let sender = Arc::new(HttpSender::new(
            endpoint.clone(),
            config.api_key.clone(),
            SDK_LANGUAGE,
            env!("CARGO_PKG_VERSION"),
        ));

        let deps = SchedulerDeps {
            buffer: buffer.clone(),
            disk: disk.clone(),
            sender,
            sdk_header_name: SDK_HEADER_NAME.to_string(),
            flush_interval: config.flush_interval,
            batch_size: config.batch_size,
            max_buffer_size: config.max_buffer_size,
            max_storage_bytes: config.max_storage_bytes,
            on_error: config.on_error.clone(),
            debug: config.debug,
        };

        // Recover anything left over from a previous process before the
        // worker starts taking new events, so admission order downstream
        // still reflects "recovered, then newly admitted".
        scheduler::recover_from_disk(&deps);

        let scheduler = FlushScheduler::start(deps.clone(), wake_rx);

        let inner = Arc::new(ClientInner {
            config_endpoint: endpoint,
            config_max_event_bytes: config.max_event_bytes,
            config_max_storage_bytes: config.max_storage_bytes,
            config_collect_query_string: config.collect_query_string,
            identify_consumer_override: config.identify_consumer.clone(),
            buffer,
            disk,
            deps,
            scheduler: Mutex::new(Some(scheduler)),
            shutting_down: AtomicBool::new(false),
            signal_guard: Mutex::new(None),
        });

        Ok(Client { inner })
    }

    /// The validated, immutable ingest endpoint.
    pub fn endpoint(&self) -> &str {
        &self.inner.config_endpoint
    }

    /// Derives a consumer ID from request headers, using the configured
    /// override if present, otherwise the default header-priority policy.
    pub fn identify_consumer(&self, headers: &HashMap<String, String>) -> Option<String> {
        match &self.inner.identify_consumer_override {
            Some(f) => f(headers),
            None => identify_consumer(headers),
        }
    }

    /// Admits `event` into the buffer after sanitization. Never blocks on
    /// I/O; never panics; has no effect once shutdown has begun.
    pub fn track(&self, event: serde_json::Value) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        match sanitize_event(event, self.inner.config_max_event_bytes) {
            Ok(sanitized) => match self.inner.buffer.push(sanitized) {
                crate::buffer::PushOutcome::Admitted => {}
                crate::buffer::PushOutcome::Dropped => {
                    scheduler::report(
                        &self.inner.deps,
                        Diagnostic::BufferFull {
                            max_buffer_size: self.inner.buffer.max_buffer_size(),
                        },
                    );
                }
            },
            Err(crate::event::SanitizeError::Oversized { byte_len, limit }) => {
                scheduler::report(&self.inner.deps, Diagnostic::Oversized { byte_len, limit });
            }
            Err(crate::event::SanitizeError::NotAMapping) => {}
        }
    }

    /// Whether `collect_query_string` is enabled, for middleware that
    /// builds `path` before calling `track`.
    pub fn collect_query_string(&self) -> bool {
        self.inner.config_collect_query_string
    }

    /// Builds the `path` a middleware should put on the event: `path`
    /// unchanged if `collect_query_string` is off, otherwise `path` with
    /// `query` appended as a sorted `?key=value&...` string.
    pub fn request_path(&self, path: &str, query: &std::collections::BTreeMap<String, String>) -> String {
        if self.inner.config_collect_query_string {
            crate::event::append_sorted_query_string(path, query)
        } else {
            path.to_string()
        }
    }

    /// Synchronously drains and sends one batch, on the calling thread.
    /// A no-op if the buffer is empty or a flush is already in flight.
    pub fn flush(&self) {
        scheduler::flush_once(&self.inner.deps);
    }

    /// Registers `SIGTERM`/`SIGINT` handlers that call [`Client::shutdown_sync`]
    /// and then re-raise the prior disposition. Returns an error if a
    /// handler is already installed by this client or the underlying
    /// `sigaction` call fails.
    pub fn install_signal_handlers(&self) -> Result<(), Error> {
        let mut guard = self.inner.signal_guard.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let client = self.clone();
        *guard = Some(signal::install(move || client.shutdown_sync())?);
        Ok(())
    }

    /// Idempotent graceful shutdown: unwires any installed signal handlers,
    /// stops the worker, joins it with a 5s cap, issues one final
    /// synchronous flush, and persists any leftover buffered events.
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(guard) = self.inner.signal_guard.lock().unwrap().take() {
            drop(guard);
        }

        if let Some(mut sched) = self.inner.scheduler.lock().unwrap().take() {
            sched.signal_done();
            self.inner.buffer.send_wake(WakeToken::Stop);
            sched.join(std::time::Duration::from_secs(5));
        }

        scheduler::flush_once(&self.inner.deps);
        self.persist_residual_buffer();
    }

    /// Fast-path shutdown for a process-exit hook or signal handler: skips
    /// the worker join and only persists the residual buffer.
    pub fn shutdown_sync(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.persist_residual_buffer();
    }

    fn persist_residual_buffer(&self) {
        let residual = self.inner.buffer.drain_all();
        if residual.is_empty() {
            return;
        }
        if let Err(crate::disk::DiskError::StorageFull) = self.inner.disk.append_batch(&residual) {
            scheduler::report(
                &self.inner.deps,
                Diagnostic::StorageFull {
                    max_storage_bytes: self.inner.config_max_storage_bytes,
                },
            );
        }
    }
}

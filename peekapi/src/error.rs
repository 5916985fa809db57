use thiserror::Error;

/// Errors surfaced synchronously to the caller, at construction time only.
///
/// Everything that can go wrong once the client is running is not an
/// `Error`. It is a [`Diagnostic`], reported out-of-band per the
/// post-construction error policy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Error {
        Error::InvalidArgument(msg.into())
    }
}

/// Classification of an HTTP send attempt, used by the flush scheduler's
/// retry state machine.
#[derive(Debug)]
pub enum SendOutcome {
    Success,
    /// Transport-level failure: connection refused, DNS failure, timeout.
    RetryableTransport { reason: String },
    /// HTTP 429 or 5xx, with a short excerpt of the response body.
    RetryableServer { status: u16, excerpt: String },
    /// Any other non-2xx HTTP status.
    NonRetryableServer { status: u16, excerpt: String },
}

impl SendOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SendOutcome::RetryableTransport { .. } | SendOutcome::RetryableServer { .. }
        )
    }
}

/// A post-construction failure, surfaced out-of-band via `on_error` and/or
/// a stderr line when `debug` is set. Never propagated as a `Result::Err`.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// An event was dropped because it could not be shrunk under
    /// `max_event_bytes`, even after stripping `metadata`.
    Oversized { byte_len: usize, limit: usize },
    /// The in-memory buffer was full; the event was dropped.
    BufferFull { max_buffer_size: usize },
    /// The on-disk overflow file is at or above `max_storage_bytes`; the
    /// batch was dropped rather than persisted.
    StorageFull { max_storage_bytes: u64 },
    /// A flush attempt failed transiently and will be retried after
    /// backoff.
    RetryScheduled {
        batch_size: usize,
        consecutive_failures: u32,
        backoff_secs: f64,
    },
    /// The retry budget was exhausted; the batch was handed to disk.
    PersistedAfterRetries { batch_size: usize },
    /// The remote rejected the batch with a non-retryable status; the
    /// batch was handed to disk.
    PersistedNonRetryable { batch_size: usize, status: u16 },
    /// A disk I/O operation failed (write, rename, unlink).
    DiskIo { context: String, message: String },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Oversized { byte_len, limit } => {
                write!(f, "event of {byte_len} bytes exceeds {limit} byte ceiling, dropped")
            }
            Diagnostic::BufferFull { max_buffer_size } => {
                write!(f, "buffer at capacity ({max_buffer_size}), event dropped")
            }
            Diagnostic::StorageFull { max_storage_bytes } => {
                write!(f, "overflow file at or above {max_storage_bytes} bytes, batch dropped")
            }
            Diagnostic::RetryScheduled {
                batch_size,
                consecutive_failures,
                backoff_secs,
            } => write!(
                f,
                "flush of {batch_size} events failed ({consecutive_failures} consecutive), retrying in {backoff_secs:.2}s"
            ),
            Diagnostic::PersistedAfterRetries { batch_size } => {
                write!(f, "flush of {batch_size} events exhausted retries, persisted to disk")
            }
            Diagnostic::PersistedNonRetryable { batch_size, status } => write!(
                f,
                "flush of {batch_size} events rejected with status {status}, persisted to disk"
            ),
            Diagnostic::DiskIo { context, message } => {
                write!(f, "disk error ({context}): {message}")
            }
        }
    }
}

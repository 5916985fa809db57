//! Single background worker: time- or fill-triggered batching, retry
//! policy with backoff, and periodic disk recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::buffer::{BoundedBuffer, WakeToken};
use crate::disk::{DiskStore, DISK_RECOVERY_INTERVAL};
use crate::error::{Diagnostic, SendOutcome};
use crate::event::Event;
use crate::http_sender::HttpSender;

/// Number of consecutive retryable failures before a batch is persisted
/// to disk instead of retried further.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Base backoff, doubled per consecutive failure and jittered uniformly
/// in `[0.5, 1.0]`.
const BASE_BACKOFF_SECS: f64 = 1.0;

pub struct FlushScheduler {
    done: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct SchedulerDeps {
    pub buffer: Arc<BoundedBuffer>,
    pub disk: Arc<DiskStore>,
    pub sender: Arc<HttpSender>,
    pub sdk_header_name: String,
    pub flush_interval: Duration,
    pub batch_size: usize,
    pub max_buffer_size: usize,
    pub max_storage_bytes: u64,
    pub on_error: Option<Arc<dyn Fn(&Diagnostic) + Send + Sync>>,
    pub debug: bool,
}

impl FlushScheduler {
    pub fn start(deps: SchedulerDeps, wake_rx: Receiver<WakeToken>) -> FlushScheduler {
        let done = Arc::new(AtomicBool::new(false));
        let worker_done = done.clone();

        let worker = std::thread::Builder::new()
            .name("peekapi-flush".into())
            .spawn(move || run_worker(deps, wake_rx, worker_done))
            .expect("spawn peekapi flush worker");

        FlushScheduler {
            done,
            worker: Some(worker),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Joins the worker thread with a 5s cap, matching the lifecycle
    /// shutdown deadline. Idempotent: a second call is a no-op.
    pub fn join(&mut self, timeout: Duration) {
        if let Some(handle) = self.worker.take() {
            let (tx, rx) = std::sync::mpsc::channel();
            let joinable = std::thread::spawn(move || {
                let _ = handle.join();
                let _ = tx.send(());
            });
            let _ = rx.recv_timeout(timeout);
            let _ = joinable.join();
        }
    }
}

fn run_worker(deps: SchedulerDeps, wake_rx: Receiver<WakeToken>, done: Arc<AtomicBool>) {
    // `Client::new` already ran one recovery pass before spawning this
    // worker, so the next one is due a full interval from now, not
    // immediately on the first loop iteration.
    let mut last_recovery = Instant::now();

    loop {
        match wake_rx.recv_timeout(deps.flush_interval) {
            Ok(WakeToken::Stop) => break,
            Ok(WakeToken::Flush) | Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if done.load(Ordering::SeqCst) {
            break;
        }

        let batch = deps.buffer.drain_batch(deps.batch_size, Instant::now());
        if !batch.is_empty() {
            do_flush(&deps, batch);
        }

        if last_recovery.elapsed() >= DISK_RECOVERY_INTERVAL {
            recover_from_disk(&deps);
            last_recovery = Instant::now();
        }

        if done.load(Ordering::SeqCst) {
            break;
        }
    }
}

/// Drains and flushes once, synchronously, on the calling thread. Used by
/// [`crate::Client::flush`] and the shutdown path, the two cases allowed
/// to perform I/O outside the worker thread.
pub(crate) fn flush_once(deps: &SchedulerDeps) -> bool {
    let batch = deps.buffer.drain_batch(deps.batch_size, Instant::now());
    if batch.is_empty() {
        return false;
    }
    do_flush(deps, batch);
    true
}

pub(crate) fn do_flush(deps: &SchedulerDeps, batch: Vec<Event>) {
    let outcome = deps.sender.send(&batch, &deps.sdk_header_name);
    let batch_len = batch.len();

    match outcome {
        SendOutcome::Success => {
            deps.buffer.record_success();
            if let Some(recovering) = deps.buffer.take_recovering_path() {
                deps.disk.clear_recovering(&recovering);
            }
        }
        SendOutcome::NonRetryableServer { status, .. } => {
            deps.buffer.record_terminal_failure();
            persist_batch(deps, batch);
            report(deps, Diagnostic::PersistedNonRetryable { batch_size: batch_len, status });
        }
        SendOutcome::RetryableTransport { .. } | SendOutcome::RetryableServer { .. } => {
            let failures = deps.buffer.note_failure();
            if failures >= MAX_CONSECUTIVE_FAILURES {
                deps.buffer.record_terminal_failure();
                persist_batch(deps, batch);
                report(deps, Diagnostic::PersistedAfterRetries { batch_size: batch_len });
            } else {
                let backoff = backoff_for(failures);
                deps.buffer.set_backoff(backoff);
                let kept = deps.buffer.push_front(batch);
                report(
                    deps,
                    Diagnostic::RetryScheduled {
                        batch_size: kept,
                        consecutive_failures: failures,
                        backoff_secs: backoff.as_secs_f64(),
                    },
                );
            }
        }
    }
}

fn backoff_for(consecutive_failures: u32) -> Duration {
    let exp = 2f64.powi((consecutive_failures.saturating_sub(1)) as i32);
    let jitter = rand::thread_rng().gen_range(0.5..=1.0);
    Duration::from_secs_f64(BASE_BACKOFF_SECS * exp * jitter)
}

fn persist_batch(deps: &SchedulerDeps, batch: Vec<Event>) {
    if let Err(crate::disk::DiskError::StorageFull) = deps.disk.append_batch(&batch) {
        report(
            deps,
            Diagnostic::StorageFull {
                max_storage_bytes: deps.max_storage_bytes,
            },
        );
    }
}

pub(crate) fn recover_from_disk(deps: &SchedulerDeps) {
    let recovered = deps.disk.recover(deps.max_buffer_size);
    if recovered.is_empty() {
        return;
    }
    if let Some(path) = deps.disk.recovering_path_if_present() {
        deps.buffer.set_recovering_path(path);
    }
    deps.buffer.push_back_many(recovered);
}

pub(crate) fn report(deps: &SchedulerDeps, diagnostic: Diagnostic) {
    if deps.debug {
        eprintln!("[peekapi] {diagnostic}");
    }
    match &diagnostic {
        Diagnostic::Oversized { .. } | Diagnostic::BufferFull { .. } | Diagnostic::StorageFull { .. } => {
            tracing::warn!(%diagnostic, "peekapi diagnostic");
        }
        _ => tracing::debug!(%diagnostic, "peekapi diagnostic"),
    }
    if let Some(cb) = &deps.on_error {
        // Exceptions from `on_error` are themselves swallowed: Rust has no
        // exceptions to propagate, but a panicking callback must not take
        // down the worker thread, so it is isolated with `catch_unwind`.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&diagnostic)));
    }
}

//! Thread-safe FIFO of sanitized events with a hard size cap and wake
//! signaling to the background worker.
//!
//! The buffer itself and the flush-control state (`in_flight`,
//! `consecutive_failures`, `backoff_until`, the recovery-file pointer)
//! live under one mutex, so `drain_batch`'s check-then-set of
//! `in_flight` is atomic with the emptiness/backoff check.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;
use std::time::Instant;

use crate::event::Event;

/// Opaque token posted to the worker's wake channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeToken {
    Flush,
    Stop,
}

/// Outcome of a [`BoundedBuffer::push`] call.
pub enum PushOutcome {
    Admitted,
    /// The buffer was at `max_buffer_size`; the event was dropped and an
    /// immediate flush wake was posted.
    Dropped,
}

struct Inner {
    queue: VecDeque<Event>,
    in_flight: bool,
    consecutive_failures: u32,
    backoff_until: Instant,
    recovering_path: Option<PathBuf>,
}

pub struct BoundedBuffer {
    inner: Mutex<Inner>,
    wake_tx: SyncSender<WakeToken>,
    max_buffer_size: usize,
    batch_size: usize,
}

impl BoundedBuffer {
    /// Builds a buffer and its paired wake channel. The receiver half is
    /// handed to the flush scheduler's worker loop.
    pub fn new(max_buffer_size: usize, batch_size: usize) -> (BoundedBuffer, Receiver<WakeToken>) {
        let (wake_tx, wake_rx) = mpsc::sync_channel(8);
        let buffer = BoundedBuffer {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                in_flight: false,
                consecutive_failures: 0,
                backoff_until: Instant::now(),
                recovering_path: None,
            }),
            wake_tx,
            max_buffer_size,
            batch_size,
        };
        (buffer, wake_rx)
    }

    /// Posts a token without blocking; a full wake channel means a wake is
    /// already pending, so a dropped send is harmless.
    pub fn send_wake(&self, token: WakeToken) {
        match self.wake_tx.try_send(token) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn push(&self, event: Event) -> PushOutcome {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue.len() >= self.max_buffer_size {
            drop(inner);
            self.send_wake(WakeToken::Flush);
            return PushOutcome::Dropped;
        }
        inner.queue.push_back(event);
        let crossed_threshold = inner.queue.len() >= self.batch_size;
        drop(inner);
        if crossed_threshold {
            self.send_wake(WakeToken::Flush);
        }
        PushOutcome::Admitted
    }

    /// Removes up to `n` leading elements and marks a flush in flight, or
    /// returns empty without touching the queue if it is empty, a flush is
    /// already in flight, or we are still inside the backoff window.
    pub fn drain_batch(&self, n: usize, now: Instant) -> Vec<Event> {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue.is_empty() || inner.in_flight || now < inner.backoff_until {
            return Vec::new();
        }
        let take = n.min(inner.queue.len());
        let batch: Vec<Event> = inner.queue.drain(..take).collect();
        inner.in_flight = true;
        batch
    }

    /// Re-inserts `events` at the head, keeping only the prefix that fits
    /// within the remaining capacity; the tail is discarded.
    pub fn push_front(&self, events: Vec<Event>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let space = self.max_buffer_size.saturating_sub(inner.queue.len());
        let kept = events.len().min(space);
        for event in events.into_iter().take(kept).rev() {
            inner.queue.push_front(event);
        }
        kept
    }

    /// Inserts recovered events at the tail (they are older than anything
    /// admitted since, but recovery always runs after live drains in the
    /// scheduler loop, so tail insertion here reflects load order, not
    /// delivery priority).
    pub fn push_back_many(&self, events: Vec<Event>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let space = self.max_buffer_size.saturating_sub(inner.queue.len());
        let kept = events.len().min(space);
        for event in events.into_iter().take(kept) {
            inner.queue.push_back(event);
        }
        kept
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Drains every remaining event, ignoring `in_flight`/backoff. Used
    /// only by shutdown paths to persist the residual buffer.
    pub fn drain_all(&self) -> Vec<Event> {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.drain(..).collect()
    }

    pub fn clear_in_flight(&self) {
        self.inner.lock().unwrap().in_flight = false;
    }

    /// Resets retry state on a successful flush.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.backoff_until = Instant::now();
        inner.in_flight = false;
    }

    /// Increments the consecutive-failure counter and clears `in_flight`,
    /// without touching the backoff window. Returns the new count so the
    /// caller can decide whether to persist-to-disk or retry.
    pub fn note_failure(&self) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        inner.in_flight = false;
        inner.consecutive_failures
    }

    /// Sets the backoff window after deciding to retry.
    pub fn set_backoff(&self, backoff: std::time::Duration) {
        self.inner.lock().unwrap().backoff_until = Instant::now() + backoff;
    }

    /// Records that the retry budget was exhausted (or a non-retryable
    /// failure occurred); resets the failure counter and clears in-flight.
    pub fn record_terminal_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.in_flight = false;
    }

    pub fn set_recovering_path(&self, path: PathBuf) {
        self.inner.lock().unwrap().recovering_path = Some(path);
    }

    pub fn take_recovering_path(&self) -> Option<PathBuf> {
        self.inner.lock().unwrap().recovering_path.take()
    }

    pub fn peek_recovering_path(&self) -> Option<PathBuf> {
        self.inner.lock().unwrap().recovering_path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(n: u32) -> Event {
        match json!({"n": n}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn push_respects_cap() {
        let (buf, _rx) = BoundedBuffer::new(2, 10);
        assert!(matches!(buf.push(event(1)), PushOutcome::Admitted));
        assert!(matches!(buf.push(event(2)), PushOutcome::Admitted));
        assert!(matches!(buf.push(event(3)), PushOutcome::Dropped));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn drain_batch_respects_in_flight() {
        let (buf, _rx) = BoundedBuffer::new(10, 10);
        buf.push(event(1));
        let batch = buf.drain_batch(10, Instant::now());
        assert_eq!(batch.len(), 1);
        // A second drain while the first is still in flight yields nothing.
        buf.push(event(2));
        let empty = buf.drain_batch(10, Instant::now());
        assert!(empty.is_empty());
    }

    #[test]
    fn push_front_keeps_only_what_fits() {
        let (buf, _rx) = BoundedBuffer::new(2, 10);
        buf.push(event(1));
        let kept = buf.push_front(vec![event(10), event(11), event(12)]);
        assert_eq!(kept, 1);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn batch_size_threshold_posts_wake() {
        let (buf, rx) = BoundedBuffer::new(10, 2);
        buf.push(event(1));
        assert!(rx.try_recv().is_err());
        buf.push(event(2));
        assert_eq!(rx.try_recv().unwrap(), WakeToken::Flush);
    }
}

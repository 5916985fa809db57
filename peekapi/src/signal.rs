//! `SIGTERM`/`SIGINT` disposition chaining.
//!
//! Installing a handler must save the prior disposition and, after
//! running our shutdown callback, re-raise it (callable, default, or
//! `SIG_DFL`) so the SDK cooperates with a host that also hooks these
//! signals. Actual signal handlers may only call async-signal-safe code
//! (no mutexes, no allocation), so the raw handler here only flips an
//! [`AtomicBool`]; a dedicated poll thread notices the flag, runs the
//! caller's closure, and chains to the previous disposition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::Error;

static TERM_FLAGGED: AtomicBool = AtomicBool::new(false);
static INT_FLAGGED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_term(_: libc_int) {
    TERM_FLAGGED.store(true, Ordering::SeqCst);
}

extern "C" fn on_int(_: libc_int) {
    INT_FLAGGED.store(true, Ordering::SeqCst);
}

#[allow(non_camel_case_types)]
type libc_int = nix::libc::c_int;

fn registry() -> &'static Mutex<Option<Arc<dyn Fn() + Send + Sync>>> {
    static REGISTRY: OnceLock<Mutex<Option<Arc<dyn Fn() + Send + Sync>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(None))
}

/// RAII guard: dropping it restores the prior `SIGTERM`/`SIGINT`
/// dispositions and stops the poll thread.
pub struct SignalGuard {
    prev_term: SigAction,
    prev_int: SigAction,
    stop: Arc<AtomicBool>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        unsafe {
            let _ = signal::sigaction(Signal::SIGTERM, &self.prev_term);
            let _ = signal::sigaction(Signal::SIGINT, &self.prev_int);
        }
        *registry().lock().unwrap() = None;
    }
}

/// Installs handlers for `SIGTERM` and `SIGINT` that call `on_signal` and
/// then re-raise whatever disposition was previously registered.
pub fn install<F>(on_signal: F) -> Result<SignalGuard, Error>
where
    F: Fn() + Send + Sync + 'static,
{
    *registry().lock().unwrap() = Some(Arc::new(on_signal));

    let action = SigAction::new(SigHandler::Handler(on_term_dispatch), SaFlags::empty(), SigSet::empty());
    let int_action = SigAction::new(SigHandler::Handler(on_int_dispatch), SaFlags::empty(), SigSet::empty());

    let (prev_term, prev_int) = unsafe {
        let prev_term = signal::sigaction(Signal::SIGTERM, &action)
            .map_err(|e| Error::invalid(format!("could not install SIGTERM handler: {e}")))?;
        let prev_int = signal::sigaction(Signal::SIGINT, &int_action)
            .map_err(|e| Error::invalid(format!("could not install SIGINT handler: {e}")))?;
        (prev_term, prev_int)
    };

    let stop = Arc::new(AtomicBool::new(false));
    let poll_stop = stop.clone();
    let term_for_chain = prev_term.clone();
    let int_for_chain = prev_int.clone();

    std::thread::Builder::new()
        .name("peekapi-signal".into())
        .spawn(move || poll_loop(poll_stop, term_for_chain, int_for_chain))
        .expect("spawn peekapi signal poll thread");

    Ok(SignalGuard {
        prev_term,
        prev_int,
        stop,
    })
}

// These thin wrappers exist so `install` can reuse the same extern "C" fn
// pointers across calls without needing per-instance trampolines (signal
// handlers cannot close over state).
extern "C" fn on_term_dispatch(signum: libc_int) {
    on_term(signum);
}

extern "C" fn on_int_dispatch(signum: libc_int) {
    on_int(signum);
}

fn poll_loop(stop: Arc<AtomicBool>, prev_term: SigAction, prev_int: SigAction) {
    while !stop.load(Ordering::SeqCst) {
        if TERM_FLAGGED.swap(false, Ordering::SeqCst) {
            run_callback();
            chain_to_prior(Signal::SIGTERM, &prev_term);
        }
        if INT_FLAGGED.swap(false, Ordering::SeqCst) {
            run_callback();
            chain_to_prior(Signal::SIGINT, &prev_int);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn run_callback() {
    if let Some(cb) = registry().lock().unwrap().clone() {
        cb();
    }
}

fn chain_to_prior(signal: Signal, prev: &SigAction) {
    match prev.handler() {
        SigHandler::SigDfl => unsafe {
            let _ = signal::sigaction(
                signal,
                &SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty()),
            );
            let _ = signal::raise(signal);
        },
        SigHandler::SigIgn => {}
        _ => unsafe {
            let _ = signal::sigaction(signal, prev);
            let _ = signal::raise(signal);
        },
    }
}

//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is a one-way flag: once cancelled it stays cancelled. The
//! session, its transport and its batcher each hold a clone and poll it at their
//! checkpoints; nothing is interrupted preemptively.
//!
//! [`SignalListener`] connects the token to SIGINT/SIGTERM through `ctrlc`.
use std::{
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, warn};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);

        // Taking the lock orders the store before any waiter's re-check.
        let _guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `timeout` unless cancelled first.
    ///
    /// Returns `true` when the full interval elapsed and `false` when cancelled.
    pub fn sleep(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());

        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            guard = match self.inner.wake.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
    }
}

/// Cancels a token when the process receives SIGINT or SIGTERM.
///
/// `ctrlc` allows a single process-wide handler, so the listener cannot be removed;
/// dropping it disarms the handler instead.
#[derive(Debug)]
pub struct SignalListener {
    armed: Arc<AtomicBool>,
}

impl SignalListener {
    pub fn install(token: CancellationToken) -> Result<Self, ctrlc::Error> {
        let armed = Arc::new(AtomicBool::new(true));
        let handle = Arc::clone(&armed);

        ctrlc::set_handler(move || {
            if handle.load(Ordering::SeqCst) {
                warn!("action: signal_received | result: in_progress");
                token.cancel();
            }
        })?;

        Ok(Self { armed })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
        debug!("action: closing_signal_channel | result: success");
    }
}

//! Deadline-bounded background work.
//!
//! Every image decode, filter, QR render and upload in the booth runs on a
//! worker thread and is awaited with an explicit timeout. A caller that gives
//! up simply stops listening: the worker is detached and whatever it produces
//! later is dropped with the channel. Nothing here ever blocks forever.
//!
//! ```text
//! let pending = deadline::spawn("filter", move || apply_filter(&img, spec));
//! match pending.wait(Duration::from_secs(3)) {
//!     Ok(out) => out,
//!     Err(e) => { warn!(%e, "using original"); original }
//! }
//! ```

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeadlineError {
    #[error("{label} timed out after {millis}ms")]
    TimedOut { label: String, millis: u128 },
    #[error("{label} worker panicked")]
    Panicked { label: String },
    #[error("could not start {label} worker: {reason}")]
    Spawn { label: String, reason: String },
}

/// Handle to work running on a detached worker thread.
pub struct Pending<T> {
    label: String,
    rx: Result<Receiver<T>, DeadlineError>,
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending").field("label", &self.label).finish()
    }
}

/// Start `work` on a worker thread.
///
/// Spawn failures are deferred to [`Pending::wait`] so callers handle a
/// single error path.
pub fn spawn<T, F>(label: &str, work: F) -> Pending<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name(format!("booth-{label}"))
        .spawn(move || {
            // Receiver may already be gone if the caller timed out.
            let _ = tx.send(work());
        });
    let rx = match spawned {
        Ok(_) => Ok(rx),
        Err(e) => Err(DeadlineError::Spawn {
            label: label.to_string(),
            reason: e.to_string(),
        }),
    };
    Pending {
        label: label.to_string(),
        rx,
    }
}

impl<T> Pending<T> {
    /// Wait up to `timeout` for the result.
    pub fn wait(self, timeout: Duration) -> Result<T, DeadlineError> {
        let rx = self.rx?;
        match rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(DeadlineError::TimedOut {
                label: self.label,
                millis: timeout.as_millis(),
            }),
            // Sender dropped without sending: the closure unwound.
            Err(RecvTimeoutError::Disconnected) => Err(DeadlineError::Panicked { label: self.label }),
        }
    }

    /// Wait until an absolute instant.
    pub fn wait_until(self, deadline: Instant) -> Result<T, DeadlineError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.wait(remaining)
    }
}

/// Run `work` on a worker and wait at most `timeout` for it.
pub fn run_with_deadline<T, F>(label: &str, timeout: Duration, work: F) -> Result<T, DeadlineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    spawn(label, work).wait(timeout)
}

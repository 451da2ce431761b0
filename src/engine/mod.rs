//! Benchmark orchestration.
//!
//! `BenchmarkRunner` drives the per-coin phase sequence; `RunContext`
//! carries the session identity and the cancellation signal through it.

pub mod runner;

pub use runner::BenchmarkRunner;

use tokio::sync::watch;

/// Per-run context handed down into the run loop. Cheap to clone; all
/// clones observe the same cancellation flag.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub session_id: String,
    cancel: watch::Receiver<bool>,
}

impl RunContext {
    pub fn new(session_id: impl Into<String>, cancel: watch::Receiver<bool>) -> Self {
        Self {
            session_id: session_id.into(),
            cancel,
        }
    }

    /// Context that can never be cancelled, for tests and one-shot runs.
    pub fn never_cancelled(session_id: impl Into<String>) -> Self {
        let (_tx, rx) = watch::channel(false);
        // Dropping the sender is fine: a closed channel without a `true`
        // send is treated as "never cancelled" in `cancelled()`.
        Self::new(session_id, rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves when cancellation is requested. Pending forever if the
    /// signal never fires.
    pub async fn cancelled(&mut self) {
        if *self.cancel.borrow() {
            return;
        }
        // An Err means the sender is gone without ever signalling; treat
        // that as "never cancelled" and park.
        while self.cancel.changed().await.is_ok() {
            if *self.cancel.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

//! Time-driven dispatcher: "run this callback after that delay".
//!
//! Every timer is a task on a shared [`TaskTracker`]. A timer that is still
//! sleeping can be cancelled through its own token or through the dispatcher
//! shutdown; once the delay has elapsed the callback always runs to completion.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Clone, Default)]
pub struct Dispatcher {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a one-shot timer.
    ///
    /// Returns `false` without spawning anything once the dispatcher has been
    /// stopped. The callback is dropped unexecuted if `cancel` or the
    /// dispatcher shutdown fires before `delay` elapses.
    pub fn run_after<F>(&self, delay: Duration, cancel: CancellationToken, callback: F) -> bool
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        if self.is_stopped() {
            return false;
        }

        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {}
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => callback().await,
            }
        });
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of timers that are sleeping or running their callback.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Stop the dispatcher.
    ///
    /// Pending timers are dropped, no new timers are accepted, and callbacks
    /// already running are awaited for at most `grace`. Returns `false` if the
    /// grace period elapsed with callbacks still in flight. Safe to call more
    /// than once.
    pub async fn stop(&self, grace: Duration) -> bool {
        if !self.is_stopped() {
            info!("Stopping job dispatcher...");
        }
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                debug!("Job dispatcher stopped");
                true
            }
            Err(_) => {
                warn!(
                    "Job dispatcher stop timed out after {:?} with {} task(s) still running",
                    grace,
                    self.tracker.len()
                );
                false
            }
        }
    }
}

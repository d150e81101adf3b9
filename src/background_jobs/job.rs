use std::sync::Arc;
use std::time::Duration;

/// Result of a single [`Action`] execution.
pub type Outcome = Result<(), JobError>;

/// Errors an action can report back to the scheduler.
///
/// The scheduler never propagates these, it only uses them to decide the next
/// firing interval and to log what happened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Resource unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Build an `ExecutionFailed` from any error, keeping the whole context chain.
    pub fn failed(err: impl std::fmt::Display) -> Self {
        JobError::ExecutionFailed(format!("{:#}", err))
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::failed(err)
    }
}

/// A unit of fallible work driven by the [`AdaptiveScheduler`](super::AdaptiveScheduler).
///
/// Actions are stateless from the scheduler's point of view and are invoked
/// repeatedly. They are executed from a blocking context using `spawn_blocking`,
/// so blocking I/O (HTTP fetches, database connects, disk writes) is fine.
pub trait Action: Send + Sync {
    /// Unique identifier for this action, also used as the job name.
    fn name(&self) -> &str;

    /// Human-readable description, used in logs.
    fn description(&self) -> &str {
        ""
    }

    /// Execute the action once.
    fn execute(&self) -> Outcome;
}

/// What the scheduler should do after a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextFiring {
    /// Install a new timer with the given interval.
    Rearm { interval: Duration, changed: bool },
    /// The job is a one-shot gate that succeeded, do not schedule it again.
    Retire,
}

/// An action paired with its two candidate intervals.
///
/// `current_interval` is the interval the next timer is (or will be) armed
/// with. It starts at the retry interval since the outcome of the first run is
/// unknown, and is rewritten after every firing by [`AdaptiveScheduleJob::record_outcome`].
#[derive(Clone)]
pub struct AdaptiveScheduleJob {
    pub action: Arc<dyn Action>,
    /// `None` disables re-arming after a success.
    pub stable_interval: Option<Duration>,
    pub retry_interval: Duration,
    pub current_interval: Duration,
    /// Fire the first run right away instead of after `current_interval`.
    pub run_immediately: bool,
}

impl AdaptiveScheduleJob {
    /// A recurring job: slow cadence once healthy, fast cadence after failures.
    pub fn recurring(
        action: Arc<dyn Action>,
        stable_interval: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            action,
            stable_interval: Some(stable_interval),
            retry_interval,
            current_interval: retry_interval,
            run_immediately: false,
        }
    }

    /// A one-shot gate: retried on failure, never re-armed after the first success.
    pub fn gate(action: Arc<dyn Action>, retry_interval: Duration) -> Self {
        Self {
            action,
            stable_interval: None,
            retry_interval,
            current_interval: retry_interval,
            run_immediately: false,
        }
    }

    pub fn run_immediately(mut self) -> Self {
        self.run_immediately = true;
        self
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    /// Pick the next interval from the outcome of the run that just finished.
    pub fn record_outcome(&mut self, outcome: &Outcome) -> NextFiring {
        let previous = self.current_interval;
        let next = match (outcome, self.stable_interval) {
            (Ok(()), Some(stable)) => stable,
            (Ok(()), None) => return NextFiring::Retire,
            (Err(_), _) => self.retry_interval,
        };
        self.current_interval = next;
        NextFiring::Rearm {
            interval: next,
            changed: next != previous,
        }
    }
}

impl std::fmt::Debug for AdaptiveScheduleJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveScheduleJob")
            .field("name", &self.name())
            .field("stable_interval", &self.stable_interval)
            .field("retry_interval", &self.retry_interval)
            .field("current_interval", &self.current_interval)
            .field("run_immediately", &self.run_immediately)
            .finish()
    }
}

use super::job::{AdaptiveScheduleJob, JobError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Live handle to the single timer currently installed for a job.
#[derive(Debug)]
pub struct JobHandle {
    /// Identifies the installation; a firing whose id no longer matches the
    /// table entry is stale and must not re-arm.
    pub id: u64,
    pub armed_with: Duration,
    pub armed_at: DateTime<Utc>,
    token: CancellationToken,
    pending: Arc<PendingTimer>,
}

impl JobHandle {
    pub(super) fn new(
        id: u64,
        armed_with: Duration,
        token: CancellationToken,
        pending: Arc<PendingTimer>,
    ) -> Self {
        Self {
            id,
            armed_with,
            armed_at: Utc::now(),
            token,
            pending,
        }
    }

    /// Prevent the timer from firing. A callback already running is not interrupted.
    pub fn cancel(&self) {
        self.token.cancel();
        self.pending.release();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `None` when the due time is past what a `DateTime` can represent.
    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        let delay = chrono::Duration::from_std(self.armed_with).ok()?;
        self.armed_at.checked_add_signed(delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Armed,
    /// One-shot gate that succeeded.
    Retired,
    Disarmed,
}

/// One installed timer, counted in its job's `pending_timers` until released.
///
/// Shared between the [`JobHandle`] and the timer task: whichever of "handle
/// cancelled" or "timer fired" happens first releases the count. Dropping the
/// last reference releases it too, which covers timers refused by a stopped
/// dispatcher.
#[derive(Debug)]
pub(super) struct PendingTimer {
    counter: Arc<AtomicUsize>,
    released: AtomicBool,
}

impl PendingTimer {
    pub(super) fn new(counter: Arc<AtomicUsize>) -> Arc<Self> {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            counter,
            released: AtomicBool::new(false),
        })
    }

    pub(super) fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Entry of the scheduler's job table.
pub(super) struct ScheduledJob {
    pub job: AdaptiveScheduleJob,
    pub handle: Option<JobHandle>,
    pub status: JobStatus,
    pub is_running: bool,
    /// Delay of a re-arm requested while a firing was in flight; installed
    /// once that firing completes.
    pub deferred_delay: Option<Duration>,
    pub runs: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<JobError>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub pending_timers: Arc<AtomicUsize>,
}

impl ScheduledJob {
    pub fn new(job: AdaptiveScheduleJob) -> Self {
        Self {
            job,
            handle: None,
            status: JobStatus::Armed,
            is_running: false,
            deferred_delay: None,
            runs: 0,
            consecutive_failures: 0,
            last_error: None,
            last_run_at: None,
            pending_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cancel and drop the live handle, if any.
    pub fn cancel_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            name: self.job.name().to_string(),
            description: self.job.action.description().to_string(),
            status: self.status,
            is_running: self.is_running,
            current_interval: self.job.current_interval,
            stable_interval: self.job.stable_interval,
            retry_interval: self.job.retry_interval,
            runs: self.runs,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
            last_run_at: self.last_run_at,
            next_run_at: self.handle.as_ref().and_then(JobHandle::next_run_at),
            pending_timers: self.pending_timers.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time view of a scheduled job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub name: String,
    pub description: String,
    pub status: JobStatus,
    pub is_running: bool,
    #[serde(serialize_with = "serialize_secs")]
    pub current_interval: Duration,
    #[serde(serialize_with = "serialize_opt_secs")]
    pub stable_interval: Option<Duration>,
    #[serde(serialize_with = "serialize_secs")]
    pub retry_interval: Duration,
    pub runs: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub pending_timers: usize,
}

impl JobSnapshot {
    /// Whether the most recent run succeeded. `None` before the first run.
    pub fn last_succeeded(&self) -> Option<bool> {
        if self.runs == 0 {
            None
        } else {
            Some(self.consecutive_failures == 0)
        }
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

fn serialize_opt_secs<S: serde::Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs()),
        None => s.serialize_none(),
    }
}

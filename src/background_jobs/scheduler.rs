use super::dispatcher::Dispatcher;
use super::handle::{JobHandle, JobSnapshot, JobStatus, PendingTimer, ScheduledJob};
use super::job::{Action, AdaptiveScheduleJob, JobError, NextFiring, Outcome};
use crate::server::metrics;
use futures::FutureExt;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs actions on timers and re-programs each job from its latest outcome.
///
/// Every job has at most one live timer. The timer is only ever replaced from
/// [`arm`](Self::arm) or after the previous firing has completed, and always
/// cancels the previous handle first, so the same job never runs concurrently
/// with itself. Cheap to clone; clones share the same job table.
#[derive(Clone)]
pub struct AdaptiveScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    dispatcher: Dispatcher,
    jobs: Mutex<HashMap<String, ScheduledJob>>,
    next_handle_id: AtomicU64,
}

impl AdaptiveScheduler {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                dispatcher,
                jobs: Mutex::new(HashMap::new()),
                next_handle_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Arm a job.
    ///
    /// Arming a name that is already in the table replaces the previous job and
    /// cancels its pending timer. If that job is running, the new timer is only
    /// installed once the run completes.
    pub fn arm(&self, job: AdaptiveScheduleJob) {
        let name = job.name().to_string();
        let delay = if job.run_immediately {
            Duration::ZERO
        } else {
            job.current_interval
        };

        let mut jobs = self.inner.lock_jobs();
        let entry = match jobs.entry(name.clone()) {
            Entry::Occupied(occupied) => {
                debug!("Re-arming job {}, cancelling its previous timer", name);
                let entry = occupied.into_mut();
                entry.cancel_handle();
                entry.job = job;
                entry.status = JobStatus::Armed;
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(ScheduledJob::new(job)),
        };

        info!(
            "Arming job {} (first run in {:?}, stable: {:?}, retry: {:?})",
            name, delay, entry.job.stable_interval, entry.job.retry_interval
        );
        if entry.is_running {
            debug!("Job {} is running, deferring its new timer", name);
            entry.deferred_delay = Some(delay);
        } else {
            SchedulerInner::install(&self.inner, &name, entry, delay);
        }
    }

    /// Cancel the job's pending timer and leave it inert.
    ///
    /// A firing already in progress is allowed to finish but will not re-arm.
    /// Returns `false` if the job is unknown.
    pub fn disarm(&self, name: &str) -> bool {
        let mut jobs = self.inner.lock_jobs();
        match jobs.get_mut(name) {
            Some(entry) => {
                entry.cancel_handle();
                entry.deferred_delay = None;
                if entry.status != JobStatus::Disarmed {
                    info!("Disarmed job {}", name);
                }
                entry.status = JobStatus::Disarmed;
                true
            }
            None => false,
        }
    }

    /// Disarm every job in the table.
    pub fn disarm_all(&self) -> usize {
        let mut jobs = self.inner.lock_jobs();
        let mut count = 0;
        for (name, entry) in jobs.iter_mut() {
            if entry.status == JobStatus::Armed {
                debug!("Disarming job {}", name);
                count += 1;
            }
            entry.cancel_handle();
            entry.deferred_delay = None;
            entry.status = JobStatus::Disarmed;
        }
        count
    }

    /// Disarm everything and stop the underlying dispatcher, waiting at most
    /// `grace` for in-flight runs. No timer fires after this returns.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.disarm_all();
        self.inner.dispatcher.stop(grace).await
    }

    pub fn snapshot(&self, name: &str) -> Option<JobSnapshot> {
        self.inner.lock_jobs().get(name).map(ScheduledJob::snapshot)
    }

    /// Snapshots of all jobs, sorted by name.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .inner
            .lock_jobs()
            .values()
            .map(ScheduledJob::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Names of jobs that currently hold a live timer.
    pub fn armed_jobs(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock_jobs()
            .iter()
            .filter(|(_, entry)| entry.status == JobStatus::Armed)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock_jobs().len()
    }
}

impl SchedulerInner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, ScheduledJob>> {
        // A poisoned table still holds consistent entries: every mutation is a
        // plain field assignment.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a fresh timer for `entry`, replacing any previous handle.
    fn install(this: &Arc<Self>, name: &str, entry: &mut ScheduledJob, delay: Duration) {
        entry.cancel_handle();

        let handle_id = this.next_handle_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let pending = PendingTimer::new(Arc::clone(&entry.pending_timers));

        let scheduler = Arc::clone(this);
        let job_name = name.to_string();
        let action = Arc::clone(&entry.job.action);

        let timer = Arc::clone(&pending);
        let accepted = this.dispatcher.run_after(delay, token.clone(), move || {
            async move {
                timer.release();
                scheduler.fire(job_name, handle_id, action).await;
            }
            .boxed()
        });

        if accepted {
            entry.handle = Some(JobHandle::new(handle_id, delay, token, pending));
            metrics::set_background_job_interval(name, delay);
        } else {
            warn!("Dispatcher is stopped, job {} was not armed", name);
            entry.status = JobStatus::Disarmed;
        }
    }

    async fn fire(self: Arc<Self>, name: String, handle_id: u64, action: Arc<dyn Action>) {
        {
            let mut jobs = self.lock_jobs();
            match jobs.get_mut(&name) {
                Some(entry) if Self::is_live(entry, handle_id) => entry.is_running = true,
                _ => {
                    debug!("Dropping stale firing of job {}", name);
                    return;
                }
            }
        }

        debug!("Running job {}", name);
        metrics::set_background_job_running(&name, true);
        let start_time = Instant::now();
        let outcome: Outcome = match tokio::task::spawn_blocking(move || action.execute()).await {
            Ok(outcome) => outcome,
            Err(e) => Err(JobError::Panicked(e.to_string())),
        };
        let elapsed = start_time.elapsed();

        let status_label = match &outcome {
            Ok(()) => {
                info!("Job {} completed successfully in {:?}", name, elapsed);
                "success"
            }
            Err(e @ JobError::Panicked(_)) => {
                error!("Job {} panicked after {:?}: {}", name, elapsed, e);
                "panic"
            }
            Err(e) => {
                warn!("Job {} failed after {:?}: {}", name, elapsed, e);
                "failed"
            }
        };
        metrics::record_background_job_execution(&name, status_label, elapsed);
        metrics::set_background_job_running(&name, false);

        let mut jobs = self.lock_jobs();
        let Some(entry) = jobs.get_mut(&name) else {
            return;
        };
        entry.is_running = false;

        // Re-armed while running: the outcome belongs to the replaced job
        if let Some(delay) = entry.deferred_delay.take() {
            debug!("Job {} was re-armed during its run, installing its new timer", name);
            if entry.status == JobStatus::Armed {
                Self::install(&self, &name, entry, delay);
            }
            return;
        }

        entry.runs += 1;
        entry.last_run_at = Some(chrono::Utc::now());
        match &outcome {
            Ok(()) => {
                entry.consecutive_failures = 0;
                entry.last_error = None;
            }
            Err(e) => {
                entry.consecutive_failures += 1;
                entry.last_error = Some(e.clone());
            }
        }

        // Disarmed (or re-armed by someone else) while running: keep the
        // outcome for observation but do not schedule again.
        if !Self::is_live(entry, handle_id) {
            debug!("Job {} was disarmed during its run, not re-arming", name);
            return;
        }

        match entry.job.record_outcome(&outcome) {
            NextFiring::Retire => {
                entry.cancel_handle();
                entry.status = JobStatus::Retired;
                info!("Job {} succeeded and is retired", name);
            }
            NextFiring::Rearm { interval, changed } => {
                if changed {
                    info!("Job {} interval changed to {:?}", name, interval);
                }
                Self::install(&self, &name, entry, interval);
            }
        }
    }

    fn is_live(entry: &ScheduledJob, handle_id: u64) -> bool {
        entry.status == JobStatus::Armed
            && entry
                .handle
                .as_ref()
                .is_some_and(|h| h.id == handle_id && !h.is_cancelled())
    }
}

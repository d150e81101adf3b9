//! Startup sequencing: connect to the database, run the backfills, then
//! declare the worker ready.
//!
//! The connect step is a gate armed on the [`AdaptiveScheduler`] and retried
//! until it succeeds. Everything after it runs once, in order, and only
//! reports failures.

mod steps;

pub use steps::{backfill_steps, connect_step, BootstrapStep, DATABASE_CONNECT_STEP};

use crate::background_jobs::{AdaptiveScheduleJob, AdaptiveScheduler, JobError};
use crate::console_store::PersistenceGateway;
use crate::server::metrics;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use steps::GateAction;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    Disconnected,
    Connecting,
    Connected,
    Initializing,
    /// Terminal for the lifetime of the process.
    Ready,
}

impl BootstrapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapState::Disconnected => "disconnected",
            BootstrapState::Connecting => "connecting",
            BootstrapState::Connected => "connected",
            BootstrapState::Initializing => "initializing",
            BootstrapState::Ready => "ready",
        }
    }
}

impl std::fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened during a completed bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Steps that ran, in execution order, including the connect gate.
    pub executed: Vec<String>,
    /// Best-effort steps that failed.
    pub failed: Vec<String>,
    /// How many times the connect gate ran before it passed.
    pub connect_attempts: u64,
}

pub struct BootstrapSequencer {
    scheduler: AdaptiveScheduler,
    connect: BootstrapStep,
    steps: Vec<BootstrapStep>,
    retry_interval: Duration,
    state: watch::Sender<BootstrapState>,
    started: AtomicBool,
}

impl BootstrapSequencer {
    pub fn new(
        scheduler: AdaptiveScheduler,
        connect: BootstrapStep,
        steps: Vec<BootstrapStep>,
        retry_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(BootstrapState::Disconnected);
        Self {
            scheduler,
            connect,
            steps,
            retry_interval,
            state,
            started: AtomicBool::new(false),
        }
    }

    /// The standard chain for a persistence gateway.
    pub fn for_gateway(
        scheduler: AdaptiveScheduler,
        gateway: Arc<dyn PersistenceGateway>,
        retry_interval: Duration,
    ) -> Self {
        Self::new(
            scheduler,
            connect_step(Arc::clone(&gateway)),
            backfill_steps(gateway),
            retry_interval,
        )
    }

    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: BootstrapState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!("Bootstrap state: {} -> {}", previous, state);
        }
        metrics::set_bootstrap_state(state as u8);
    }

    /// Drive the chain to [`BootstrapState::Ready`].
    ///
    /// Returns `None` if `shutdown` fires first, or if the sequence was
    /// already run once by this sequencer.
    pub async fn run(&self, shutdown: CancellationToken) -> Option<BootstrapReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Bootstrap sequence already started, ignoring");
            return None;
        }

        let mut report = BootstrapReport::default();

        self.set_state(BootstrapState::Connecting);
        let Some(attempts) = self.pass_gate(&self.connect, &shutdown).await else {
            info!("Shutdown requested while connecting, bootstrap aborted");
            return None;
        };
        report.executed.push(self.connect.name.clone());
        report.connect_attempts = attempts;
        self.set_state(BootstrapState::Connected);

        self.set_state(BootstrapState::Initializing);
        for step in &self.steps {
            if shutdown.is_cancelled() {
                info!("Shutdown requested while initializing, bootstrap aborted");
                return None;
            }

            if step.fatal {
                if self.pass_gate(step, &shutdown).await.is_none() {
                    return None;
                }
                report.executed.push(step.name.clone());
                continue;
            }

            let runner = step.clone();
            let outcome = match tokio::task::spawn_blocking(move || runner.apply()).await {
                Ok(outcome) => outcome,
                Err(e) => Err(JobError::Panicked(e.to_string())),
            };
            report.executed.push(step.name.clone());
            if let Err(e) = outcome {
                warn!("Bootstrap step {} failed, continuing: {}", step.name, e);
                metrics::record_bootstrap_step_failure(&step.name);
                report.failed.push(step.name.clone());
            }
        }

        self.set_state(BootstrapState::Ready);
        info!(
            "Bootstrap complete after {} connect attempt(s), {} of {} step(s) failed",
            report.connect_attempts,
            report.failed.len(),
            self.steps.len()
        );
        Some(report)
    }

    /// Arm `step` as a one-shot gate and wait for its first success, returning
    /// the number of attempts. Returns `None` if `shutdown` fires first; the
    /// gate is disarmed then.
    async fn pass_gate(&self, step: &BootstrapStep, shutdown: &CancellationToken) -> Option<u64> {
        let (passed_tx, mut passed_rx) = watch::channel(None);
        let gate = GateAction::new(step.clone(), passed_tx);
        self.scheduler
            .arm(AdaptiveScheduleJob::gate(Arc::new(gate), self.retry_interval).run_immediately());

        loop {
            let passed = *passed_rx.borrow_and_update();
            if passed.is_some() {
                return passed;
            }
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.scheduler.disarm(&step.name);
                    return None;
                }
                changed = passed_rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

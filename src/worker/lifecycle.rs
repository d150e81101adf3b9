use super::state::{LifecyclePhase, WorkerState};
use super::{WorkerDeps, WorkerSettings};
use crate::background_jobs::jobs::CatalogDownloadAction;
use crate::background_jobs::{AdaptiveScheduleJob, AdaptiveScheduler, Dispatcher};
use crate::bootstrap::{BootstrapSequencer, BootstrapState};
use crate::catalogs::{ensure_dir, HttpFetcher};
use crate::console_store::{
    PersistenceGateway, SettingsReader, DEFAULT_SESSION_LIFETIME_MINUTES, DEFAULT_UPDATE_CHANNEL,
};
use crate::logging::LogGuard;
use crate::server::{ServiceContext, ServiceHandle, ServiceStarter, SessionManager};
use anyhow::{bail, Result};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Single owner of the worker's process-wide state.
///
/// [`start`](Self::start) creates the working directories and hands control
/// to the bootstrap sequence; everything else (front-ends, session manager,
/// catalog jobs) is started only once the sequence reaches
/// [`BootstrapState::Ready`]. [`stop`](Self::stop) tears down in reverse
/// order and can be called at any point, any number of times.
///
/// Cheap to clone; clones drive the same worker.
#[derive(Clone)]
pub struct WorkerLifecycle {
    inner: Arc<LifecycleInner>,
}

struct LifecycleInner {
    settings: WorkerSettings,
    gateway: Arc<dyn PersistenceGateway>,
    settings_reader: Arc<dyn SettingsReader>,
    fetcher: Arc<dyn HttpFetcher>,
    web: Box<dyn ServiceStarter>,
    auth: Box<dyn ServiceStarter>,
    scheduler: AdaptiveScheduler,
    sequencer: BootstrapSequencer,
    shutdown: CancellationToken,
    state: Mutex<WorkerState>,
    ready: watch::Sender<bool>,
    log_guard: Mutex<Option<LogGuard>>,
    start_time: Instant,
}

impl WorkerLifecycle {
    pub fn new(settings: WorkerSettings, deps: WorkerDeps) -> Self {
        let scheduler = AdaptiveScheduler::new(Dispatcher::new());
        let sequencer = BootstrapSequencer::for_gateway(
            scheduler.clone(),
            Arc::clone(&deps.gateway),
            settings.connect_retry_interval,
        );
        let (ready, _) = watch::channel(false);

        Self {
            inner: Arc::new(LifecycleInner {
                settings,
                gateway: deps.gateway,
                settings_reader: deps.settings,
                fetcher: deps.fetcher,
                web: deps.web,
                auth: deps.auth,
                scheduler,
                sequencer,
                shutdown: CancellationToken::new(),
                state: Mutex::new(WorkerState::new()),
                ready,
                log_guard: Mutex::new(None),
                start_time: Instant::now(),
            }),
        }
    }

    /// Hand over the log file guard so that it is flushed as the very last
    /// teardown step.
    pub fn attach_log_guard(&self, guard: LogGuard) {
        *self.inner.lock_log_guard() = Some(guard);
    }

    /// Create the working directories and launch the bootstrap sequence.
    ///
    /// Returns once the sequence is running; readiness is reached in the
    /// background. Fails if the directories cannot be created or if the worker
    /// was already started or stopped.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.inner.lock_state();
        match state.phase {
            LifecyclePhase::Created => {}
            LifecyclePhase::Running => bail!("Worker is already running"),
            LifecyclePhase::Stopping | LifecyclePhase::Stopped => {
                bail!("Worker has been stopped and cannot be restarted")
            }
        }

        let settings = &self.inner.settings;
        ensure_dir(&settings.data_dir)?;
        ensure_dir(&settings.catalogs_dir)?;

        let inner = Arc::clone(&self.inner);
        state.bootstrap_task = Some(tokio::spawn(async move { inner.run_bootstrap().await }));
        state.phase = LifecyclePhase::Running;

        info!(
            "Worker started (data: {}, catalogs: {}, offline: {})",
            settings.data_dir.display(),
            settings.catalogs_dir.display(),
            settings.offline
        );
        Ok(())
    }

    /// Tear everything down in reverse acquisition order.
    ///
    /// Every step runs even if an earlier one failed; failures are logged.
    /// Calling it again, concurrently, or before [`start`](Self::start) is a
    /// no-op beyond the first call.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let bootstrap_task = {
            let mut state = inner.lock_state();
            if state.is_shutting_down() {
                debug!("Worker stop already requested");
                return;
            }
            state.phase = LifecyclePhase::Stopping;
            state.bootstrap_task.take()
        };
        info!("Stopping worker...");

        let grace = inner.settings.shutdown_grace;
        inner.shutdown.cancel();
        if let Some(mut task) = bootstrap_task {
            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Bootstrap task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Bootstrap task did not finish within {:?}, aborting it", grace);
                    task.abort();
                }
            }
        }

        let disarmed = inner.scheduler.disarm_all();
        debug!("Disarmed {} job(s)", disarmed);

        inner.scheduler.dispatcher().stop(grace).await;

        let gateway = Arc::clone(&inner.gateway);
        match tokio::task::spawn_blocking(move || gateway.close()).await {
            Ok(Ok(())) => debug!("Database connection closed"),
            Ok(Err(e)) => error!("Failed to close database connection: {:#}", e),
            Err(e) => error!("Database close task failed: {}", e),
        }

        let (sessions, web, auth) = {
            let mut state = inner.lock_state();
            (state.sessions.take(), state.web.take(), state.auth.take())
        };

        if let Some(sessions) = sessions {
            let dropped = sessions.close();
            debug!("Session manager closed, {} session(s) dropped", dropped);
        }

        for handle in [web, auth].into_iter().flatten() {
            close_service(handle).await;
        }

        inner.lock_state().phase = LifecyclePhase::Stopped;
        info!("Worker stopped");

        if let Some(guard) = inner.lock_log_guard().take() {
            debug!("Flushing log file {}", guard.path().display());
            drop(guard);
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.lock_state().phase
    }

    pub fn bootstrap_state(&self) -> BootstrapState {
        self.inner.sequencer.state()
    }

    pub fn scheduler(&self) -> &AdaptiveScheduler {
        &self.inner.scheduler
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Wait until the worker is ready. Returns `false` on timeout.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.inner.ready.subscribe();
        let reached = tokio::time::timeout(timeout, ready.wait_for(|ready| *ready))
            .await
            .is_ok_and(|result| result.is_ok());
        reached
    }

    pub fn web_addr(&self) -> Option<SocketAddr> {
        self.inner.lock_state().web.as_ref().and_then(|h| h.local_addr())
    }

    pub fn auth_addr(&self) -> Option<SocketAddr> {
        self.inner.lock_state().auth.as_ref().and_then(|h| h.local_addr())
    }

    /// Update channel resolved at Ready time.
    pub fn update_channel(&self) -> Option<String> {
        self.inner.lock_state().update_channel.clone()
    }

    /// Names of the catalog download jobs armed at Ready time.
    pub fn catalog_jobs(&self) -> Vec<String> {
        self.inner.lock_state().catalog_jobs.clone()
    }
}

impl LifecycleInner {
    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_log_guard(&self) -> MutexGuard<'_, Option<LogGuard>> {
        self.log_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run_bootstrap(self: Arc<Self>) {
        if self.sequencer.run(self.shutdown.clone()).await.is_some() {
            self.on_ready().await;
        }
    }

    /// Start everything gated behind Ready. Runs exactly once per worker.
    async fn on_ready(&self) {
        let reader = Arc::clone(&self.settings_reader);
        let (update_channel, session_lifetime) = match tokio::task::spawn_blocking(move || {
            (reader.update_channel(), reader.session_lifetime_minutes())
        })
        .await
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Settings read failed, using defaults: {}", e);
                (
                    DEFAULT_UPDATE_CHANNEL.to_string(),
                    DEFAULT_SESSION_LIFETIME_MINUTES,
                )
            }
        };
        info!(
            "Update channel: {}, session lifetime: {} minute(s)",
            update_channel, session_lifetime
        );

        let sessions = Arc::new(SessionManager::new(session_lifetime));
        {
            let mut state = self.lock_state();
            if state.is_shutting_down() {
                return;
            }
            state.sessions = Some(Arc::clone(&sessions));
            state.update_channel = Some(update_channel.clone());
        }

        let ctx = ServiceContext {
            scheduler: self.scheduler.clone(),
            bootstrap: self.sequencer.subscribe(),
            update_channel: update_channel.clone(),
            sessions,
            start_time: self.start_time,
        };
        let web = start_service(self.web.as_ref(), &ctx).await;
        let auth = start_service(self.auth.as_ref(), &ctx).await;

        let leftovers = {
            let mut state = self.lock_state();
            if state.is_shutting_down() {
                vec![web, auth]
            } else {
                state.web = web;
                state.auth = auth;
                state.catalog_jobs = self.arm_catalog_jobs(&update_channel);
                Vec::new()
            }
        };
        if !leftovers.is_empty() {
            debug!("Stop requested while starting front-ends, closing them");
            for handle in leftovers.into_iter().flatten() {
                close_service(handle).await;
            }
            return;
        }

        self.ready.send_replace(true);
        info!(
            "Worker ready in {:.1}s",
            self.start_time.elapsed().as_secs_f64()
        );
    }

    fn arm_catalog_jobs(&self, update_channel: &str) -> Vec<String> {
        let settings = &self.settings;
        settings
            .catalog_urls
            .sources(update_channel)
            .into_iter()
            .map(|source| {
                let action = CatalogDownloadAction::new(
                    source,
                    settings.catalogs_dir.clone(),
                    Arc::clone(&self.fetcher),
                    settings.offline,
                );
                let job = AdaptiveScheduleJob::recurring(
                    Arc::new(action),
                    settings.catalog_stable_interval,
                    settings.catalog_retry_interval,
                )
                .run_immediately();
                let name = job.name().to_string();
                self.scheduler.arm(job);
                name
            })
            .collect()
    }
}

async fn start_service(
    starter: &dyn ServiceStarter,
    ctx: &ServiceContext,
) -> Option<Box<dyn ServiceHandle>> {
    match starter.start(ctx).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Failed to start {} server: {:#}", starter.name(), e);
            None
        }
    }
}

async fn close_service(handle: Box<dyn ServiceHandle>) {
    let name = handle.name().to_string();
    if let Err(e) = handle.close().await {
        error!("Failed to close {} server: {:#}", name, e);
    }
}

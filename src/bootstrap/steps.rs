use crate::background_jobs::{Action, JobError, Outcome};
use crate::console_store::PersistenceGateway;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

pub const DATABASE_CONNECT_STEP: &str = "database_connect";

type ApplyFn = Arc<dyn Fn() -> Outcome + Send + Sync>;

/// One named initialization step.
///
/// A fatal step is retried by the scheduler until it succeeds and blocks the
/// chain meanwhile. A best-effort step runs once; its failure is reported and
/// the chain moves on.
#[derive(Clone)]
pub struct BootstrapStep {
    pub name: String,
    pub fatal: bool,
    apply: ApplyFn,
}

impl BootstrapStep {
    pub fn fatal<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fatal: true,
            apply: Arc::new(apply),
        }
    }

    pub fn best_effort<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn() -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fatal: false,
            apply: Arc::new(apply),
        }
    }

    pub fn apply(&self) -> Outcome {
        (self.apply)()
    }
}

impl std::fmt::Debug for BootstrapStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapStep")
            .field("name", &self.name)
            .field("fatal", &self.fatal)
            .finish()
    }
}

/// The database connect gate.
pub fn connect_step(gateway: Arc<dyn PersistenceGateway>) -> BootstrapStep {
    BootstrapStep::fatal(DATABASE_CONNECT_STEP, move || {
        gateway
            .connect()
            .map_err(|e| JobError::Unavailable(format!("{:#}", e)))
    })
}

fn counted_step<F>(name: &'static str, gateway: Arc<dyn PersistenceGateway>, op: F) -> BootstrapStep
where
    F: Fn(&dyn PersistenceGateway) -> Result<usize> + Send + Sync + 'static,
{
    BootstrapStep::best_effort(name, move || {
        let updated = op(gateway.as_ref())?;
        if updated > 0 {
            info!("Bootstrap step {} updated {} row(s)", name, updated);
        } else {
            debug!("Bootstrap step {} had nothing to do", name);
        }
        Ok(())
    })
}

/// The best-effort steps run after connect, in their fixed order.
pub fn backfill_steps(gateway: Arc<dyn PersistenceGateway>) -> Vec<BootstrapStep> {
    let settings = Arc::clone(&gateway);
    let tenant = Arc::clone(&gateway);
    vec![
        BootstrapStep::best_effort("create_initial_settings", move || {
            Ok(settings.create_initial_settings()?)
        }),
        BootstrapStep::best_effort("create_default_tenant_and_site", move || {
            Ok(tenant.create_default_tenant_and_site()?)
        }),
        counted_step("associate_agents_to_default_site", gateway.clone(), |g| {
            g.associate_agents_to_default_site()
        }),
        counted_step("associate_tags_to_default_tenant", gateway.clone(), |g| {
            g.associate_tags_to_default_tenant()
        }),
        counted_step("associate_metadata_to_default_tenant", gateway.clone(), |g| {
            g.associate_metadata_to_default_tenant()
        }),
        counted_step("associate_profiles_to_default_tenant", gateway.clone(), |g| {
            g.associate_profiles_to_default_tenant()
        }),
        counted_step("assign_default_agent_nicknames", gateway, |g| {
            g.assign_default_agent_nicknames()
        }),
    ]
}

/// Scheduler action wrapping a fatal step.
///
/// On the first success, publishes the number of attempts it took on `passed`.
pub(super) struct GateAction {
    step: BootstrapStep,
    description: String,
    attempts: AtomicU64,
    passed: watch::Sender<Option<u64>>,
}

impl GateAction {
    pub(super) fn new(step: BootstrapStep, passed: watch::Sender<Option<u64>>) -> Self {
        let description = format!("Bootstrap gate {}", step.name);
        Self {
            step,
            description,
            attempts: AtomicU64::new(0),
            passed,
        }
    }
}

impl Action for GateAction {
    fn name(&self) -> &str {
        &self.step.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&self) -> Outcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.step.apply()?;
        self.passed.send_replace(Some(attempt));
        Ok(())
    }
}

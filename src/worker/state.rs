use crate::server::{ServiceHandle, SessionManager};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Everything the worker started and must tear down.
pub(super) struct WorkerState {
    pub phase: LifecyclePhase,
    pub bootstrap_task: Option<JoinHandle<()>>,
    pub sessions: Option<Arc<SessionManager>>,
    pub web: Option<Box<dyn ServiceHandle>>,
    pub auth: Option<Box<dyn ServiceHandle>>,
    pub update_channel: Option<String>,
    pub catalog_jobs: Vec<String>,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            phase: LifecyclePhase::Created,
            bootstrap_task: None,
            sessions: None,
            web: None,
            auth: None,
            update_channel: None,
            catalog_jobs: Vec::new(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(self.phase, LifecyclePhase::Stopping | LifecyclePhase::Stopped)
    }
}

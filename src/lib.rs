//! Console Worker Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod bootstrap;
pub mod catalogs;
pub mod config;
pub mod console_store;
pub mod logging;
pub mod server;
pub mod worker;

// Re-export commonly used types for convenience
pub use background_jobs::{Action, AdaptiveScheduleJob, AdaptiveScheduler, Dispatcher};
pub use bootstrap::{BootstrapSequencer, BootstrapState};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use worker::{LifecyclePhase, WorkerDeps, WorkerLifecycle, WorkerSettings};

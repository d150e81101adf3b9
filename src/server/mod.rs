//! Front-ends started once the worker is ready, plus the metrics registry.

pub mod auth;
pub mod console;
pub mod metrics;
mod service;
mod session;

pub use service::{HttpService, ServiceContext, ServiceHandle, ServiceStarter};
pub use session::{Session, SessionError, SessionManager};

/// Version string reported by the front-ends and the startup log.
pub fn worker_version() -> String {
    format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"))
}

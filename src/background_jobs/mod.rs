//! Adaptive background job scheduling.
//!
//! An [`Action`] is wrapped in an [`AdaptiveScheduleJob`] carrying a stable and
//! a retry interval. The [`AdaptiveScheduler`] runs it on the [`Dispatcher`]
//! and re-arms it with the interval picked from the latest outcome.

mod dispatcher;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use dispatcher::Dispatcher;
pub use handle::{JobHandle, JobSnapshot, JobStatus};
pub use job::{Action, AdaptiveScheduleJob, JobError, NextFiring, Outcome};
pub use scheduler::AdaptiveScheduler;

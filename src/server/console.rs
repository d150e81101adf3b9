//! Web console front-end: liveness, worker status and Prometheus metrics.

use super::metrics::metrics_handler;
use super::ServiceContext;
use crate::background_jobs::JobSnapshot;
use crate::bootstrap::BootstrapState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HomeResponse {
    service: &'static str,
    version: String,
    uptime: String,
}

#[derive(Serialize)]
struct StatusResponse {
    bootstrap_state: BootstrapState,
    update_channel: String,
    active_sessions: usize,
    jobs: Vec<JobSnapshot>,
}

fn format_uptime(elapsed: std::time::Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(ctx): State<ServiceContext>) -> Json<HomeResponse> {
    Json(HomeResponse {
        service: "console-worker",
        version: super::worker_version(),
        uptime: format_uptime(ctx.start_time.elapsed()),
    })
}

async fn status(State(ctx): State<ServiceContext>) -> Json<StatusResponse> {
    let bootstrap_state = *ctx.bootstrap.borrow();
    ctx.sessions.purge_expired();
    Json(StatusResponse {
        bootstrap_state,
        update_channel: ctx.update_channel.clone(),
        active_sessions: ctx.sessions.len(),
        jobs: ctx.scheduler.snapshots(),
    })
}

pub fn make_router(ctx: ServiceContext) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/v1/status", get(status))
        .route("/metrics", get(metrics_handler))
        .with_state(ctx)
}

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all console worker metrics
const PREFIX: &str = "console_worker";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Total background job executions"),
        &["job", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job execution duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0]),
        &["job"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_INTERVAL_SECONDS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_interval_seconds"), "Interval the job is currently armed with"),
        &["job"]
    ).expect("Failed to create background_job_interval_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether the job is currently running (1) or not (0)"),
        &["job"]
    ).expect("Failed to create background_job_running metric");

    // Bootstrap Metrics
    pub static ref BOOTSTRAP_STATE: Gauge = Gauge::new(
        format!("{PREFIX}_bootstrap_state"),
        "Bootstrap state (0 disconnected, 1 connecting, 2 connected, 3 initializing, 4 ready)"
    ).expect("Failed to create bootstrap_state metric");

    pub static ref BOOTSTRAP_STEP_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_bootstrap_step_failures_total"), "Failed bootstrap steps"),
        &["step"]
    ).expect("Failed to create bootstrap_step_failures_total metric");

    // Catalog Metrics
    pub static ref CATALOG_DOWNLOADED_BYTES: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_downloaded_bytes"), "Size of the last published catalog download"),
        &["catalog"]
    ).expect("Failed to create catalog_downloaded_bytes metric");

    // Session Metrics
    pub static ref AUTH_ACTIVE_SESSIONS: Gauge = Gauge::new(
        format!("{PREFIX}_auth_active_sessions"),
        "Number of active authentication sessions"
    ).expect("Failed to create auth_active_sessions metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_INTERVAL_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(BOOTSTRAP_STATE.clone()));
    let _ = REGISTRY.register(Box::new(BOOTSTRAP_STEP_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_DOWNLOADED_BYTES.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_ACTIVE_SESSIONS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record one finished background job run
pub fn record_background_job_execution(job: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_interval(job: &str, interval: Duration) {
    BACKGROUND_JOB_INTERVAL_SECONDS
        .with_label_values(&[job])
        .set(interval.as_secs_f64());
}

pub fn set_background_job_running(job: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job])
        .set(if running { 1.0 } else { 0.0 });
}

/// Record the bootstrap state as its ordinal
pub fn set_bootstrap_state(ordinal: u8) {
    BOOTSTRAP_STATE.set(ordinal as f64);
}

pub fn record_bootstrap_step_failure(step: &str) {
    BOOTSTRAP_STEP_FAILURES_TOTAL
        .with_label_values(&[step])
        .inc();
}

pub fn set_catalog_downloaded_bytes(catalog: &str, bytes: usize) {
    CATALOG_DOWNLOADED_BYTES
        .with_label_values(&[catalog])
        .set(bytes as f64);
}

pub fn set_active_sessions(count: usize) {
    AUTH_ACTIVE_SESSIONS.set(count as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

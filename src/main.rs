use anyhow::Result;
use clap::Parser;
use std::{fmt::Debug, path::PathBuf};
use tracing::{info, warn};

use console_worker::config::{self, Environment};
use console_worker::logging::init_logging;
use console_worker::server::{metrics, worker_version};
use console_worker::worker::{WorkerDeps, WorkerLifecycle};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[clap(version)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Working directory; holds the database and the catalogs by default.
    #[clap(long, value_parser = parse_path)]
    pub data_dir: Option<PathBuf>,

    /// Where downloaded catalogs are published. Defaults to <data-dir>/catalogs.
    #[clap(long, value_parser = parse_path)]
    pub catalogs_dir: Option<PathBuf>,

    /// SQLite database file. Defaults to <data-dir>/console.db.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Deployment environment. Development implies --offline.
    #[clap(long)]
    pub environment: Option<Environment>,

    /// Skip all outbound catalog downloads.
    #[clap(long)]
    pub offline: bool,

    /// Address both front-ends bind to. Defaults to 0.0.0.0.
    #[clap(long)]
    pub bind_address: Option<std::net::IpAddr>,

    /// Web console port (default 1323).
    #[clap(long)]
    pub web_port: Option<u16>,

    /// Auth front-end port (default 1324).
    #[clap(long)]
    pub auth_port: Option<u16>,

    /// Also write logs to this file.
    #[clap(long, value_parser = parse_path)]
    pub log_file: Option<PathBuf>,

    /// Seconds between database connection attempts (default 30).
    #[clap(long)]
    pub connect_retry_secs: Option<u64>,

    /// Seconds between catalog downloads once healthy (default 21600).
    #[clap(long)]
    pub catalog_stable_secs: Option<u64>,

    /// Seconds before retrying a failed catalog download (default 120).
    #[clap(long)]
    pub catalog_retry_secs: Option<u64>,

    /// Timeout in seconds for a single catalog download (default 300).
    #[clap(long)]
    pub fetch_timeout_secs: Option<u64>,

    /// Upper bound in seconds for each shutdown wait (default 10).
    #[clap(long)]
    pub shutdown_grace_secs: Option<u64>,

    /// Release metadata URL; `{channel}` is replaced by the update channel.
    #[clap(long)]
    pub release_url: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            data_dir: args.data_dir.clone(),
            catalogs_dir: args.catalogs_dir.clone(),
            db_path: args.db_path.clone(),
            environment: args.environment,
            offline: args.offline,
            bind_address: args.bind_address,
            web_port: args.web_port,
            auth_port: args.auth_port,
            log_file: args.log_file.clone(),
            connect_retry_secs: args.connect_retry_secs,
            catalog_stable_secs: args.catalog_stable_secs,
            catalog_retry_secs: args.catalog_retry_secs,
            fetch_timeout_secs: args.fetch_timeout_secs,
            shutdown_grace_secs: args.shutdown_grace_secs,
            release_url: args.release_url.clone(),
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, initiating graceful shutdown"),
                    _ = terminate.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                }
                return;
            }
            Err(e) => warn!("Could not install SIGTERM handler: {}", e),
        }
    }
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => warn!("Could not listen for Ctrl+C, shutting down: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => Some(config::FileConfig::load(path)?),
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI); invalid config stops here
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    let log_guard = init_logging(app_config.log_file.as_deref())?;

    info!("Console worker {}", worker_version());
    if let Some(path) = &cli_args.config {
        info!("Configuration loaded from {:?}", path);
    }
    info!("  data_dir: {:?}", app_config.data_dir);
    info!("  db_path: {:?}", app_config.db_path);
    info!("  environment: {:?}", app_config.environment);
    info!("  web: {}, auth: {}", app_config.web_addr(), app_config.auth_addr());

    info!("Initializing metrics...");
    metrics::init_metrics();

    let settings = app_config.worker_settings();
    let deps = WorkerDeps::production(&settings);
    let worker = WorkerLifecycle::new(settings, deps);
    if let Some(guard) = log_guard {
        worker.attach_log_guard(guard);
    }

    if let Err(e) = worker.start().await {
        worker.stop().await;
        return Err(e);
    }

    shutdown_signal().await;
    worker.stop().await;
    Ok(())
}

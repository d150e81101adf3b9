//! Process-level orchestration: ordered startup behind the bootstrap gate and
//! ordered, idempotent teardown.

mod lifecycle;
mod state;

pub use lifecycle::WorkerLifecycle;
pub use state::LifecyclePhase;

use crate::catalogs::{CatalogUrls, HttpFetcher, ReqwestFetcher};
use crate::console_store::{PersistenceGateway, SettingsReader, SqliteConsoleStore};
use crate::server::{HttpService, ServiceStarter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Plain inputs the worker is constructed with. Validated by the config layer.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub data_dir: PathBuf,
    pub catalogs_dir: PathBuf,
    pub db_path: PathBuf,
    pub connect_retry_interval: Duration,
    pub catalog_stable_interval: Duration,
    pub catalog_retry_interval: Duration,
    /// Catalog downloads succeed without touching the network.
    pub offline: bool,
    pub catalog_urls: CatalogUrls,
    pub web_addr: SocketAddr,
    pub auth_addr: SocketAddr,
    /// Upper bound for each wait during shutdown.
    pub shutdown_grace: Duration,
    pub fetch_timeout: Duration,
}

/// External collaborators of the worker.
pub struct WorkerDeps {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub settings: Arc<dyn SettingsReader>,
    pub fetcher: Arc<dyn HttpFetcher>,
    pub web: Box<dyn ServiceStarter>,
    pub auth: Box<dyn ServiceStarter>,
}

impl WorkerDeps {
    /// SQLite store, reqwest fetcher and the two HTTP front-ends.
    pub fn production(settings: &WorkerSettings) -> Self {
        let store = Arc::new(SqliteConsoleStore::new(&settings.db_path));
        let user_agent = format!("console-worker/{}", crate::server::worker_version());
        Self {
            gateway: store.clone(),
            settings: store,
            fetcher: Arc::new(ReqwestFetcher::new(user_agent, settings.fetch_timeout)),
            web: Box::new(HttpService::console(settings.web_addr)),
            auth: Box::new(HttpService::auth(settings.auth_addr)),
        }
    }
}

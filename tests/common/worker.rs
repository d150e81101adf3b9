//! Test worker lifecycle management
//!
//! Each test gets an isolated worker with its own data directory and fakes.
//! Tests stop the worker explicitly; nothing is torn down on drop.

use super::constants::*;
use super::fakes::{FakeFetcher, FakeGateway, FakeStarter, StarterStats};
use console_worker::catalogs::CatalogUrls;
use console_worker::server::{metrics, HttpService, ServiceStarter};
use console_worker::worker::{WorkerDeps, WorkerLifecycle, WorkerSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestWorker {
    pub worker: WorkerLifecycle,
    pub gateway: Arc<FakeGateway>,
    pub fetcher: Arc<FakeFetcher>,
    /// Stats of the fake web front-end (untouched with real HTTP services)
    pub web: Arc<StarterStats>,
    /// Stats of the fake auth front-end (untouched with real HTTP services)
    pub auth: Arc<StarterStats>,
    pub catalogs_dir: PathBuf,
    pub catalog_stable_interval: Duration,
    pub catalog_retry_interval: Duration,

    // Keep the data directory alive until drop
    _temp_dir: TempDir,
}

pub struct TestWorkerBuilder {
    reachable: bool,
    offline: bool,
    release_url: Option<String>,
    real_http: bool,
    failing_web: bool,
    failing_steps: Vec<&'static str>,
    settings_unreadable: bool,
}

impl TestWorker {
    pub fn builder() -> TestWorkerBuilder {
        TestWorkerBuilder {
            reachable: true,
            offline: true,
            release_url: None,
            real_http: false,
            failing_web: false,
            failing_steps: Vec::new(),
            settings_unreadable: false,
        }
    }

    /// Start a worker with a reachable database and wait until it is ready.
    ///
    /// # Panics
    ///
    /// Panics if the worker fails to start or does not become ready in time.
    pub async fn spawn_ready() -> Self {
        let worker = Self::builder().start().await;
        worker.wait_ready().await;
        worker
    }

    pub async fn wait_ready(&self) {
        assert!(
            self.worker.wait_ready(READY_TIMEOUT).await,
            "Worker did not become ready within {:?} (state: {})",
            READY_TIMEOUT,
            self.worker.bootstrap_state()
        );
    }

    /// Wait until every armed catalog job has completed at least one run.
    pub async fn wait_catalog_runs(&self) {
        let jobs = self.worker.catalog_jobs();
        let scheduler = self.worker.scheduler().clone();
        let done = wait_until(|| {
            jobs.iter().all(|name| {
                scheduler
                    .snapshot(name)
                    .is_some_and(|snapshot| snapshot.runs >= 1 && !snapshot.is_running)
            })
        })
        .await;
        assert!(done, "Catalog jobs did not run within {:?}", POLL_TIMEOUT);
    }
}

impl TestWorkerBuilder {
    pub fn unreachable_database(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn online(mut self) -> Self {
        self.offline = false;
        self
    }

    pub fn release_url(mut self, url: &str) -> Self {
        self.release_url = Some(url.to_string());
        self
    }

    /// Serve the real web console and auth routers on ephemeral ports.
    pub fn real_http(mut self) -> Self {
        self.real_http = true;
        self
    }

    pub fn failing_web(mut self) -> Self {
        self.failing_web = true;
        self
    }

    pub fn failing_step(mut self, step: &'static str) -> Self {
        self.failing_steps.push(step);
        self
    }

    pub fn settings_unreadable(mut self) -> Self {
        self.settings_unreadable = true;
        self
    }

    /// Build the worker without starting it.
    pub fn build(self) -> TestWorker {
        metrics::init_metrics();

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        let catalogs_dir = data_dir.join("catalogs");

        let settings = WorkerSettings {
            data_dir: data_dir.clone(),
            catalogs_dir: catalogs_dir.clone(),
            db_path: data_dir.join("console.db"),
            connect_retry_interval: CONNECT_RETRY,
            catalog_stable_interval: Duration::from_secs(6 * 3600),
            catalog_retry_interval: Duration::from_secs(120),
            offline: self.offline,
            catalog_urls: CatalogUrls {
                release_url: self.release_url,
                ..CatalogUrls::default()
            },
            web_addr: "127.0.0.1:0".parse().unwrap(),
            auth_addr: "127.0.0.1:0".parse().unwrap(),
            shutdown_grace: SHUTDOWN_GRACE,
            fetch_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        };

        let gateway = Arc::new(FakeGateway::new(self.reachable));
        for step in &self.failing_steps {
            gateway.fail_step(step);
        }
        if self.settings_unreadable {
            gateway.make_settings_unreadable();
        }
        let fetcher = Arc::new(FakeFetcher::default());

        let (fake_web, web) = FakeStarter::new("web", self.failing_web);
        let (fake_auth, auth) = FakeStarter::new("auth", false);
        let (web_starter, auth_starter): (Box<dyn ServiceStarter>, Box<dyn ServiceStarter>) =
            if self.real_http {
                (
                    Box::new(HttpService::console(settings.web_addr)),
                    Box::new(HttpService::auth(settings.auth_addr)),
                )
            } else {
                (Box::new(fake_web), Box::new(fake_auth))
            };

        let deps = WorkerDeps {
            gateway: gateway.clone(),
            settings: gateway.clone(),
            fetcher: fetcher.clone(),
            web: web_starter,
            auth: auth_starter,
        };
        let catalog_stable_interval = settings.catalog_stable_interval;
        let catalog_retry_interval = settings.catalog_retry_interval;

        TestWorker {
            worker: WorkerLifecycle::new(settings, deps),
            gateway,
            fetcher,
            web,
            auth,
            catalogs_dir,
            catalog_stable_interval,
            catalog_retry_interval,
            _temp_dir: temp_dir,
        }
    }

    /// Build and start the worker. Does not wait for readiness.
    pub async fn start(self) -> TestWorker {
        let worker = self.build();
        worker
            .worker
            .start()
            .await
            .expect("Failed to start worker");
        worker
    }
}

/// Poll `condition` until it holds or [`POLL_TIMEOUT`] elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

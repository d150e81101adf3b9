//! In-memory collaborators for the worker
//!
//! Every fake counts how it was used so tests can assert on ordering and on
//! exactly-once behavior without touching the network or a real database.

use super::constants::*;
use anyhow::{bail, Result};
use async_trait::async_trait;
use console_worker::bootstrap::BootstrapState;
use console_worker::catalogs::{FetchError, HttpFetcher};
use console_worker::console_store::{PersistenceGateway, SettingsReader};
use console_worker::server::{ServiceContext, ServiceHandle, ServiceStarter};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Persistence
// ============================================================================

/// Database stand-in: connect succeeds only while `reachable` is set.
#[derive(Default)]
pub struct FakeGateway {
    reachable: AtomicBool,
    connected: AtomicBool,
    connect_attempts: AtomicUsize,
    closes: AtomicUsize,
    backfill_calls: Mutex<Vec<String>>,
    failing_steps: Mutex<HashSet<String>>,
    settings_unreadable: AtomicBool,
}

impl FakeGateway {
    pub fn new(reachable: bool) -> Self {
        let gateway = Self::default();
        gateway.set_reachable(reachable);
        gateway
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn fail_step(&self, step: &str) {
        self.failing_steps.lock().unwrap().insert(step.to_string());
    }

    pub fn make_settings_unreadable(&self) {
        self.settings_unreadable.store(true, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_connected_now(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Backfill operations in the order they were invoked.
    pub fn backfill_calls(&self) -> Vec<String> {
        self.backfill_calls.lock().unwrap().clone()
    }

    fn backfill(&self, step: &str) -> Result<usize> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("{} called before connect", step);
        }
        self.backfill_calls.lock().unwrap().push(step.to_string());
        if self.failing_steps.lock().unwrap().contains(step) {
            bail!("{} failed on purpose", step);
        }
        Ok(1)
    }
}

impl PersistenceGateway for FakeGateway {
    fn connect(&self) -> Result<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn create_initial_settings(&self) -> Result<()> {
        self.backfill("create_initial_settings").map(|_| ())
    }

    fn create_default_tenant_and_site(&self) -> Result<()> {
        self.backfill("create_default_tenant_and_site").map(|_| ())
    }

    fn associate_agents_to_default_site(&self) -> Result<usize> {
        self.backfill("associate_agents_to_default_site")
    }

    fn associate_tags_to_default_tenant(&self) -> Result<usize> {
        self.backfill("associate_tags_to_default_tenant")
    }

    fn associate_metadata_to_default_tenant(&self) -> Result<usize> {
        self.backfill("associate_metadata_to_default_tenant")
    }

    fn associate_profiles_to_default_tenant(&self) -> Result<usize> {
        self.backfill("associate_profiles_to_default_tenant")
    }

    fn assign_default_agent_nicknames(&self) -> Result<usize> {
        self.backfill("assign_default_agent_nicknames")
    }
}

impl SettingsReader for FakeGateway {
    fn read_update_channel(&self) -> Result<Option<String>> {
        if self.settings_unreadable.load(Ordering::SeqCst) {
            bail!("settings table is locked");
        }
        Ok(Some(TEST_UPDATE_CHANNEL.to_string()))
    }

    fn read_session_lifetime_minutes(&self) -> Result<Option<u64>> {
        if self.settings_unreadable.load(Ordering::SeqCst) {
            bail!("settings table is locked");
        }
        Ok(Some(TEST_SESSION_LIFETIME_MINUTES))
    }
}

// ============================================================================
// Catalog fetches
// ============================================================================

/// Returns [`TEST_CATALOG_BODY`] for every URL, or a transport error while
/// `failing` is set.
#[derive(Default)]
pub struct FakeFetcher {
    failing: AtomicBool,
    urls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl HttpFetcher for FakeFetcher {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Transport {
                url: url.to_string(),
                message: "network unreachable".to_string(),
            });
        }
        Ok(TEST_CATALOG_BODY.to_vec())
    }
}

// ============================================================================
// Front-ends
// ============================================================================

/// What happened to one fake front-end.
#[derive(Default)]
pub struct StarterStats {
    starts: AtomicUsize,
    closes: AtomicUsize,
    states_at_start: Mutex<Vec<BootstrapState>>,
    channels_at_start: Mutex<Vec<String>>,
}

impl StarterStats {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Bootstrap state observed by each start call.
    pub fn states_at_start(&self) -> Vec<BootstrapState> {
        self.states_at_start.lock().unwrap().clone()
    }

    pub fn channels_at_start(&self) -> Vec<String> {
        self.channels_at_start.lock().unwrap().clone()
    }
}

pub struct FakeStarter {
    name: &'static str,
    fail: bool,
    stats: Arc<StarterStats>,
}

impl FakeStarter {
    pub fn new(name: &'static str, fail: bool) -> (Self, Arc<StarterStats>) {
        let stats = Arc::new(StarterStats::default());
        (
            Self {
                name,
                fail,
                stats: stats.clone(),
            },
            stats,
        )
    }
}

#[async_trait]
impl ServiceStarter for FakeStarter {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self, ctx: &ServiceContext) -> Result<Box<dyn ServiceHandle>> {
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        self.stats
            .states_at_start
            .lock()
            .unwrap()
            .push(*ctx.bootstrap.borrow());
        self.stats
            .channels_at_start
            .lock()
            .unwrap()
            .push(ctx.update_channel.clone());
        if self.fail {
            bail!("address already in use");
        }
        Ok(Box::new(FakeHandle {
            name: self.name,
            stats: self.stats.clone(),
        }))
    }
}

struct FakeHandle {
    name: &'static str,
    stats: Arc<StarterStats>,
}

#[async_trait]
impl ServiceHandle for FakeHandle {
    fn name(&self) -> &str {
        self.name
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

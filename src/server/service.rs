use crate::background_jobs::AdaptiveScheduler;
use crate::bootstrap::BootstrapState;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::session::SessionManager;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a front-end may read, handed over when it is started.
#[derive(Clone)]
pub struct ServiceContext {
    pub scheduler: AdaptiveScheduler,
    pub bootstrap: watch::Receiver<BootstrapState>,
    pub update_channel: String,
    pub sessions: Arc<SessionManager>,
    pub start_time: Instant,
}

/// Starts a front-end and returns an owned handle to it.
#[async_trait]
pub trait ServiceStarter: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self, ctx: &ServiceContext) -> Result<Box<dyn ServiceHandle>>;
}

#[async_trait]
pub trait ServiceHandle: Send + Sync {
    fn name(&self) -> &str;
    fn local_addr(&self) -> Option<SocketAddr>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// An axum router served on a TCP listener.
pub struct HttpService {
    name: String,
    bind_addr: SocketAddr,
    make_router: fn(ServiceContext) -> Router,
}

impl HttpService {
    pub fn new(
        name: impl Into<String>,
        bind_addr: SocketAddr,
        make_router: fn(ServiceContext) -> Router,
    ) -> Self {
        Self {
            name: name.into(),
            bind_addr,
            make_router,
        }
    }

    /// The web console front-end.
    pub fn console(bind_addr: SocketAddr) -> Self {
        Self::new("web", bind_addr, super::console::make_router)
    }

    /// The auth front-end.
    pub fn auth(bind_addr: SocketAddr) -> Self {
        Self::new("auth", bind_addr, super::auth::make_router)
    }
}

#[async_trait]
impl ServiceStarter for HttpService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: &ServiceContext) -> Result<Box<dyn ServiceHandle>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {} server to {}", self.name, self.bind_addr))?;
        let local_addr = listener.local_addr()?;
        let app = (self.make_router)(ctx.clone());

        let shutdown = CancellationToken::new();
        let serve_shutdown = shutdown.clone();
        let name = self.name.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(serve_shutdown.cancelled_owned())
                .await
            {
                error!("{} server error: {}", name, e);
            }
        });

        info!("{} server listening on {}", self.name, local_addr);
        Ok(Box::new(HttpServiceHandle {
            name: self.name.clone(),
            local_addr,
            shutdown,
            task,
        }))
    }
}

struct HttpServiceHandle {
    name: String,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

#[async_trait]
impl ServiceHandle for HttpServiceHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let HttpServiceHandle {
            name,
            shutdown,
            task,
            ..
        } = *self;
        shutdown.cancel();
        match tokio::time::timeout(CLOSE_TIMEOUT, task).await {
            Ok(Ok(())) => {
                info!("{} server stopped", name);
                Ok(())
            }
            Ok(Err(e)) => Err(anyhow!("{} server task failed: {}", name, e)),
            Err(_) => bail!("{} server did not stop within {:?}", name, CLOSE_TIMEOUT),
        }
    }
}

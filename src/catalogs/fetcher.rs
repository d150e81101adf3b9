//! Blocking HTTP fetch primitive used by the catalog download jobs.

use reqwest::blocking::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("Failed to read body from {url}: {message}")]
    Body { url: String, message: String },
}

/// `GET url -> bytes`. Called from blocking contexts only.
pub trait HttpFetcher: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`HttpFetcher`] backed by a `reqwest` blocking client.
///
/// The client is built on first use: a blocking client cannot be created from
/// inside an async context, and the fetcher itself is constructed there.
pub struct ReqwestFetcher {
    client: OnceLock<Result<Client, String>>,
    timeout: Duration,
    user_agent: String,
}

impl ReqwestFetcher {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: OnceLock::new(),
            timeout,
            user_agent: user_agent.into(),
        }
    }

    fn client(&self, url: &str) -> Result<&Client, FetchError> {
        let built = self.client.get_or_init(|| {
            Client::builder()
                .user_agent(self.user_agent.as_str())
                .timeout(self.timeout)
                .build()
                .map_err(|e| e.to_string())
        });
        built.as_ref().map_err(|message| FetchError::Transport {
            url: url.to_string(),
            message: format!("HTTP client unavailable: {}", message),
        })
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let client = self.client(url)?;
        debug!("GET {}", url);

        let response = client.get(url).send().map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

//! HTTP client for end-to-end tests
//!
//! This module wraps reqwest and provides methods for the web console and
//! auth endpoints. When routes or request formats change, update only this
//! file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(addr: SocketAddr) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url: format!("http://{}", addr),
        }
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Request failed")
    }

    // ========================================================================
    // Web console
    // ========================================================================

    pub async fn get_home(&self) -> Response {
        self.get("/").await
    }

    pub async fn get_status(&self) -> Response {
        self.get("/api/v1/status").await
    }

    pub async fn get_metrics(&self) -> Response {
        self.get("/metrics").await
    }

    // ========================================================================
    // Auth
    // ========================================================================

    pub async fn get_health(&self) -> Response {
        self.get("/health").await
    }

    pub async fn create_session(&self, subject: &str) -> Response {
        self.client
            .post(format!("{}/auth/sessions", self.base_url))
            .json(&json!({ "subject": subject }))
            .send()
            .await
            .expect("Create session request failed")
    }

    pub async fn get_session(&self, token: &str) -> Response {
        self.get(&format!("/auth/sessions/{}", token)).await
    }

    pub async fn delete_session(&self, token: &str) -> Response {
        self.client
            .delete(format!("{}/auth/sessions/{}", self.base_url, token))
            .send()
            .await
            .expect("Delete session request failed")
    }

    /// Whether anything still accepts connections at this address.
    pub async fn is_reachable(&self) -> bool {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .is_ok()
    }
}

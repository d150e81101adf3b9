//! Catalog download action.
//!
//! Fetches one external catalog over HTTP and publishes it under the catalogs
//! directory. The previous copy stays current until a complete, validated
//! download replaces it. In offline mode the action succeeds without touching
//! the network.

use crate::background_jobs::job::{Action, JobError, Outcome};
use crate::catalogs::{publish_atomically, CatalogFormat, CatalogSource, HttpFetcher};
use crate::server::metrics;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub struct CatalogDownloadAction {
    source: CatalogSource,
    destination: PathBuf,
    description: String,
    fetcher: Arc<dyn HttpFetcher>,
    offline: bool,
}

impl CatalogDownloadAction {
    pub fn new(
        source: CatalogSource,
        catalogs_dir: impl Into<PathBuf>,
        fetcher: Arc<dyn HttpFetcher>,
        offline: bool,
    ) -> Self {
        let destination = catalogs_dir.into().join(&source.file_name);
        let description = format!("Download {} into {}", source.url, destination.display());
        Self {
            source,
            destination,
            description,
            fetcher,
            offline,
        }
    }

    pub fn destination(&self) -> &PathBuf {
        &self.destination
    }

    fn validate(&self, body: &[u8]) -> Outcome {
        if body.is_empty() {
            return Err(JobError::InvalidPayload(format!(
                "{} returned an empty body",
                self.source.url
            )));
        }
        if self.source.format == CatalogFormat::Json {
            serde_json::from_slice::<serde::de::IgnoredAny>(body).map_err(|e| {
                JobError::InvalidPayload(format!("{} is not valid JSON: {}", self.source.url, e))
            })?;
        }
        Ok(())
    }
}

impl Action for CatalogDownloadAction {
    fn name(&self) -> &str {
        &self.source.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute(&self) -> Outcome {
        if self.offline {
            debug!("Offline mode, skipping download of {}", self.source.name);
            return Ok(());
        }

        let body = self
            .fetcher
            .get(&self.source.url)
            .map_err(|e| JobError::Unavailable(e.to_string()))?;
        self.validate(&body)?;

        publish_atomically(&self.destination, &body)?;
        metrics::set_catalog_downloaded_bytes(&self.source.name, body.len());
        info!(
            "Published {} ({} bytes) to {}",
            self.source.name,
            body.len(),
            self.destination.display()
        );
        Ok(())
    }
}

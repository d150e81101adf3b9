use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub catalogs_dir: Option<String>,
    pub db_path: Option<String>,
    pub environment: Option<String>,
    pub offline: Option<bool>,
    pub bind_address: Option<String>,
    pub web_port: Option<u16>,
    pub auth_port: Option<u16>,
    pub log_file: Option<String>,
    pub shutdown_grace_secs: Option<u64>,

    // Feature configs
    pub jobs: Option<JobsConfig>,
    pub catalogs: Option<CatalogsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub connect_retry_secs: Option<u64>,
    pub catalog_stable_secs: Option<u64>,
    pub catalog_retry_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CatalogsConfig {
    /// May contain a `{channel}` placeholder.
    pub release_url: Option<String>,
    pub winget_url: Option<String>,
    pub flatpak_url: Option<String>,
    pub homebrew_url: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

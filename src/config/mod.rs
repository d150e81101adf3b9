mod file_config;

pub use file_config::{CatalogsConfig, FileConfig, JobsConfig};

use crate::catalogs::{CatalogUrls, CHANNEL_PLACEHOLDER};
use crate::console_store::DEFAULT_UPDATE_CHANNEL;
use crate::worker::WorkerSettings;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONNECT_RETRY_SECS: u64 = 30;
pub const DEFAULT_CATALOG_STABLE_SECS: u64 = 6 * 3600;
pub const DEFAULT_CATALOG_RETRY_SECS: u64 = 120;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
pub const DEFAULT_WEB_PORT: u16 = 1323;
pub const DEFAULT_AUTH_PORT: u16 = 1324;
/// Upper bound for every configured interval (ten years).
pub const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 3600;

pub const DB_FILE_NAME: &str = "console.db";
pub const CATALOGS_DIR_NAME: &str = "catalogs";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    #[default]
    Production,
    /// No outbound catalog downloads.
    Development,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub catalogs_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub environment: Option<Environment>,
    pub offline: bool,
    pub bind_address: Option<IpAddr>,
    pub web_port: Option<u16>,
    pub auth_port: Option<u16>,
    pub log_file: Option<PathBuf>,
    pub connect_retry_secs: Option<u64>,
    pub catalog_stable_secs: Option<u64>,
    pub catalog_retry_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    pub release_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub data_dir: PathBuf,
    pub catalogs_dir: PathBuf,
    pub db_path: PathBuf,
    pub environment: Environment,
    pub offline: bool,
    pub bind_address: IpAddr,
    pub web_port: u16,
    pub auth_port: u16,
    pub log_file: Option<PathBuf>,
    pub shutdown_grace: Duration,

    // Scheduling
    pub connect_retry_interval: Duration,
    pub catalog_stable_interval: Duration,
    pub catalog_retry_interval: Duration,
    pub fetch_timeout: Duration,

    pub catalog_urls: CatalogUrls,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;
        // Created at startup when missing, but must not be something else
        if data_dir.exists() && !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let catalogs_dir = file
            .catalogs_dir
            .map(PathBuf::from)
            .or_else(|| cli.catalogs_dir.clone())
            .unwrap_or_else(|| data_dir.join(CATALOGS_DIR_NAME));
        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME));

        let environment = match file.environment {
            Some(s) => parse_environment(&s)
                .ok_or_else(|| anyhow!("Unknown environment in config file: {:?}", s))?,
            None => cli.environment.unwrap_or_default(),
        };
        let offline = file.offline.unwrap_or(cli.offline) || environment == Environment::Development;

        let bind_address = match file.bind_address {
            Some(s) => s
                .parse()
                .map_err(|e| anyhow!("Invalid bind_address {:?}: {}", s, e))?,
            None => cli
                .bind_address
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        };
        let web_port = file.web_port.or(cli.web_port).unwrap_or(DEFAULT_WEB_PORT);
        let auth_port = file.auth_port.or(cli.auth_port).unwrap_or(DEFAULT_AUTH_PORT);
        if web_port == 0 || auth_port == 0 {
            bail!("web_port and auth_port must be non-zero");
        }
        if web_port == auth_port {
            bail!("web_port and auth_port must differ (both are {})", web_port);
        }

        let log_file = file.log_file.map(PathBuf::from).or_else(|| cli.log_file.clone());

        let shutdown_grace = non_zero_secs(
            "shutdown_grace_secs",
            file.shutdown_grace_secs
                .or(cli.shutdown_grace_secs)
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        )?;

        // Job intervals - merge file config with defaults
        let jobs = file.jobs.unwrap_or_default();
        let connect_retry_interval = non_zero_secs(
            "connect_retry_secs",
            jobs.connect_retry_secs
                .or(cli.connect_retry_secs)
                .unwrap_or(DEFAULT_CONNECT_RETRY_SECS),
        )?;
        let catalog_stable_interval = non_zero_secs(
            "catalog_stable_secs",
            jobs.catalog_stable_secs
                .or(cli.catalog_stable_secs)
                .unwrap_or(DEFAULT_CATALOG_STABLE_SECS),
        )?;
        let catalog_retry_interval = non_zero_secs(
            "catalog_retry_secs",
            jobs.catalog_retry_secs
                .or(cli.catalog_retry_secs)
                .unwrap_or(DEFAULT_CATALOG_RETRY_SECS),
        )?;
        let fetch_timeout = non_zero_secs(
            "fetch_timeout_secs",
            jobs.fetch_timeout_secs
                .or(cli.fetch_timeout_secs)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        )?;

        let catalogs = file.catalogs.unwrap_or_default();
        let defaults = CatalogUrls::default();
        let catalog_urls = CatalogUrls {
            release_url: catalogs.release_url.or_else(|| cli.release_url.clone()),
            winget_url: catalogs.winget_url.unwrap_or(defaults.winget_url),
            flatpak_url: catalogs.flatpak_url.unwrap_or(defaults.flatpak_url),
            homebrew_url: catalogs.homebrew_url.unwrap_or(defaults.homebrew_url),
        };
        validate_catalog_urls(&catalog_urls)?;

        Ok(Self {
            data_dir,
            catalogs_dir,
            db_path,
            environment,
            offline,
            bind_address,
            web_port,
            auth_port,
            log_file,
            shutdown_grace,
            connect_retry_interval,
            catalog_stable_interval,
            catalog_retry_interval,
            fetch_timeout,
            catalog_urls,
        })
    }

    pub fn web_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.web_port)
    }

    pub fn auth_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.auth_port)
    }

    /// The plain inputs the worker is constructed with.
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            data_dir: self.data_dir.clone(),
            catalogs_dir: self.catalogs_dir.clone(),
            db_path: self.db_path.clone(),
            connect_retry_interval: self.connect_retry_interval,
            catalog_stable_interval: self.catalog_stable_interval,
            catalog_retry_interval: self.catalog_retry_interval,
            offline: self.offline,
            catalog_urls: self.catalog_urls.clone(),
            web_addr: self.web_addr(),
            auth_addr: self.auth_addr(),
            shutdown_grace: self.shutdown_grace,
            fetch_timeout: self.fetch_timeout,
        }
    }
}

/// Parses an environment name. Uses clap's ValueEnum trait for parsing.
fn parse_environment(s: &str) -> Option<Environment> {
    Environment::from_str(s, true).ok()
}

fn non_zero_secs(field: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        bail!("{} must be greater than zero", field);
    }
    if secs > MAX_INTERVAL_SECS {
        bail!("{} must be at most {} seconds", field, MAX_INTERVAL_SECS);
    }
    Ok(Duration::from_secs(secs))
}

fn validate_catalog_urls(urls: &CatalogUrls) -> Result<()> {
    if let Some(template) = &urls.release_url {
        validate_url(
            "release_url",
            &template.replace(CHANNEL_PLACEHOLDER, DEFAULT_UPDATE_CHANNEL),
        )?;
    }
    for (field, url) in [
        ("winget_url", &urls.winget_url),
        ("flatpak_url", &urls.flatpak_url),
        ("homebrew_url", &urls.homebrew_url),
    ] {
        if url.contains(CHANNEL_PLACEHOLDER) {
            bail!("{} must not contain {}", field, CHANNEL_PLACEHOLDER);
        }
        validate_url(field, url)?;
    }
    Ok(())
}

fn validate_url(field: &str, url: &str) -> Result<()> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| anyhow!("Invalid {} {:?}: {}", field, url, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => bail!("{} must be an http(s) URL, got scheme {:?}", field, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_with_data_dir(dir: &TempDir) -> CliConfig {
        CliConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_environment() {
        assert_eq!(parse_environment("production"), Some(Environment::Production));
        assert_eq!(parse_environment("development"), Some(Environment::Development));
        // Case insensitive
        assert_eq!(parse_environment("DEVELOPMENT"), Some(Environment::Development));
        // Invalid
        assert!(parse_environment("staging").is_none());
    }

    #[test]
    fn test_resolve_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli_with_data_dir(&temp_dir), None).unwrap();

        assert_eq!(config.data_dir, temp_dir.path());
        assert_eq!(config.catalogs_dir, temp_dir.path().join("catalogs"));
        assert_eq!(config.db_path, temp_dir.path().join("console.db"));
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.offline);
        assert_eq!(config.web_port, 1323);
        assert_eq!(config.auth_port, 1324);
        assert_eq!(config.connect_retry_interval, Duration::from_secs(30));
        assert_eq!(config.catalog_stable_interval, Duration::from_secs(6 * 3600));
        assert_eq!(config.catalog_retry_interval, Duration::from_secs(120));
        assert!(config.catalog_urls.release_url.is_none());
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            data_dir: Some(PathBuf::from("/should/be/overridden")),
            web_port: Some(3000),
            auth_port: Some(3001),
            connect_retry_secs: Some(5),
            ..Default::default()
        };
        let file_config = FileConfig {
            data_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            web_port: Some(4000),
            jobs: Some(JobsConfig {
                catalog_retry_secs: Some(60),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.data_dir, temp_dir.path());
        assert_eq!(config.web_port, 4000);
        assert_eq!(config.catalog_retry_interval, Duration::from_secs(60));
        // CLI value used when TOML doesn't specify
        assert_eq!(config.auth_port, 3001);
        assert_eq!(config.connect_retry_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_resolve_missing_data_dir_error() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("data_dir must be specified"));
    }

    #[test]
    fn test_resolve_data_dir_not_directory_error() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            data_dir: Some(temp_file.path().to_path_buf()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_resolve_missing_data_dir_is_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            data_dir: Some(temp_dir.path().join("not-yet-created")),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_ok());
    }

    #[test]
    fn test_development_environment_implies_offline() {
        let temp_dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            environment: Some("development".to_string()),
            ..Default::default()
        };
        let config =
            AppConfig::resolve(&cli_with_data_dir(&temp_dir), Some(file_config)).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert!(config.offline);
    }

    #[test]
    fn test_unknown_environment_error() {
        let temp_dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            environment: Some("staging".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_with_data_dir(&temp_dir), Some(file_config));
        assert!(result.unwrap_err().to_string().contains("Unknown environment"));
    }

    #[test]
    fn test_zero_interval_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            catalog_stable_secs: Some(0),
            ..cli_with_data_dir(&temp_dir)
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("catalog_stable_secs must be greater than zero"));
    }

    #[test]
    fn test_oversized_interval_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            catalog_stable_secs: Some(10_u64.pow(13)),
            ..cli_with_data_dir(&temp_dir)
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("catalog_stable_secs must be at most"));

        let cli = CliConfig {
            connect_retry_secs: Some(MAX_INTERVAL_SECS),
            ..cli_with_data_dir(&temp_dir)
        };
        assert!(AppConfig::resolve(&cli, None).is_ok());
    }

    #[test]
    fn test_port_validation() {
        let temp_dir = TempDir::new().unwrap();

        let same_ports = CliConfig {
            web_port: Some(5000),
            auth_port: Some(5000),
            ..cli_with_data_dir(&temp_dir)
        };
        assert!(AppConfig::resolve(&same_ports, None)
            .unwrap_err()
            .to_string()
            .contains("must differ"));

        let zero_port = CliConfig {
            auth_port: Some(0),
            ..cli_with_data_dir(&temp_dir)
        };
        assert!(AppConfig::resolve(&zero_port, None).is_err());
    }

    #[test]
    fn test_release_url_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            release_url: Some("https://releases.example.com/{channel}/index.json".to_string()),
            ..cli_with_data_dir(&temp_dir)
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(
            config.catalog_urls.release_url.as_deref(),
            Some("https://releases.example.com/{channel}/index.json")
        );
    }

    #[test]
    fn test_placeholder_rejected_outside_release_url() {
        let temp_dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            catalogs: Some(CatalogsConfig {
                flatpak_url: Some("https://mirror.example.com/{channel}/appstream".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_with_data_dir(&temp_dir), Some(file_config));
        assert!(result.unwrap_err().to_string().contains("flatpak_url"));
    }

    #[test]
    fn test_invalid_catalog_url() {
        let temp_dir = TempDir::new().unwrap();
        let file_config = FileConfig {
            catalogs: Some(CatalogsConfig {
                homebrew_url: Some("not a url".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli_with_data_dir(&temp_dir), Some(file_config)).is_err());

        let ftp = FileConfig {
            catalogs: Some(CatalogsConfig {
                winget_url: Some("ftp://mirror.example.com/source.msix".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli_with_data_dir(&temp_dir), Some(ftp));
        assert!(result.unwrap_err().to_string().contains("http(s)"));
    }

    #[test]
    fn test_worker_settings() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            bind_address: Some("127.0.0.1".parse().unwrap()),
            offline: true,
            ..cli_with_data_dir(&temp_dir)
        };
        let settings = AppConfig::resolve(&cli, None).unwrap().worker_settings();

        assert_eq!(settings.web_addr, "127.0.0.1:1323".parse().unwrap());
        assert_eq!(settings.auth_addr, "127.0.0.1:1324".parse().unwrap());
        assert!(settings.offline);
        assert_eq!(settings.db_path, temp_dir.path().join("console.db"));
        assert_eq!(settings.catalog_urls, CatalogUrls::default());
    }
}

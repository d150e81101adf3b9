//! External catalogs mirrored by the worker: release metadata and
//! third-party package databases.

mod fetcher;
mod publish;

pub use fetcher::{FetchError, HttpFetcher, ReqwestFetcher};
pub use publish::{ensure_dir, publish_atomically};

use serde::Serialize;

pub const WINGET_SOURCE_URL: &str = "https://cdn.winget.microsoft.com/cache/source.msix";
pub const FLATHUB_APPSTREAM_URL: &str = "https://flathub.org/api/v2/appstream";
pub const HOMEBREW_FORMULAE_URL: &str = "https://formulae.brew.sh/api/formula.json";

/// Placeholder substituted with the resolved update channel in release URLs.
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogFormat {
    /// Validated as JSON before publishing.
    Json,
    /// Published as-is.
    Binary,
}

/// One remote catalog and where its local copy lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSource {
    /// Also used as the download job name.
    pub name: String,
    pub url: String,
    /// File name under the catalogs directory.
    pub file_name: String,
    pub format: CatalogFormat,
}

impl CatalogSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        file_name: impl Into<String>,
        format: CatalogFormat,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            file_name: file_name.into(),
            format,
        }
    }

    /// Release metadata for `channel`, from a URL template that may contain
    /// the `{channel}` placeholder.
    pub fn releases(url_template: &str, channel: &str) -> Self {
        Self::new(
            "releases_download",
            url_template.replace(CHANNEL_PLACEHOLDER, channel),
            "releases.json",
            CatalogFormat::Json,
        )
    }

    pub fn winget() -> Self {
        Self::new(
            "winget_download",
            WINGET_SOURCE_URL,
            "winget-source.msix",
            CatalogFormat::Binary,
        )
    }

    pub fn flatpak() -> Self {
        Self::new(
            "flatpak_download",
            FLATHUB_APPSTREAM_URL,
            "flatpak-appstream.json",
            CatalogFormat::Json,
        )
    }

    pub fn homebrew() -> Self {
        Self::new(
            "homebrew_download",
            HOMEBREW_FORMULAE_URL,
            "homebrew-formulae.json",
            CatalogFormat::Json,
        )
    }
}

/// URLs of the catalogs the worker mirrors. `release_url` is optional since
/// not every deployment publishes its own releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUrls {
    pub release_url: Option<String>,
    pub winget_url: String,
    pub flatpak_url: String,
    pub homebrew_url: String,
}

impl Default for CatalogUrls {
    fn default() -> Self {
        Self {
            release_url: None,
            winget_url: WINGET_SOURCE_URL.to_string(),
            flatpak_url: FLATHUB_APPSTREAM_URL.to_string(),
            homebrew_url: HOMEBREW_FORMULAE_URL.to_string(),
        }
    }
}

impl CatalogUrls {
    /// Build the list of sources to arm once the update channel is known.
    pub fn sources(&self, channel: &str) -> Vec<CatalogSource> {
        let mut sources = Vec::with_capacity(4);
        if let Some(template) = &self.release_url {
            sources.push(CatalogSource::releases(template, channel));
        }
        sources.push(CatalogSource {
            url: self.winget_url.clone(),
            ..CatalogSource::winget()
        });
        sources.push(CatalogSource {
            url: self.flatpak_url.clone(),
            ..CatalogSource::flatpak()
        });
        sources.push(CatalogSource {
            url: self.homebrew_url.clone(),
            ..CatalogSource::homebrew()
        });
        sources
    }
}

use serde::{Deserialize, Serialize};

use crate::download::DownloadService;
use crate::error::DeployerError;
use crate::version::extract_version;

pub const DEPLOYER_RELEASES_URL: &str = "https://api.github.com/repos/Jobus0/ReShade-Deployer/releases/latest";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitHubRelease {
    pub name: Option<String>,
    pub tag_name: Option<String>,
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    /// Version number from the tag (`v1.4.0` -> `1.4.0`).
    pub fn version(&self) -> Option<String> {
        self.tag_name.as_deref().and_then(extract_version)
    }

    /// The downloadable zip that carries the application.
    pub fn archive_asset(&self) -> Option<&GitHubAsset> {
        self.assets
            .iter()
            .filter(|a| a.browser_download_url.is_some())
            .find(|a| a.name.to_ascii_lowercase().ends_with(".zip"))
            .or_else(|| self.assets.iter().find(|a| a.browser_download_url.is_some()))
    }
}

pub async fn fetch_latest_release(service: &DownloadService) -> Result<GitHubRelease, DeployerError> {
    service.get_json::<GitHubRelease>(DEPLOYER_RELEASES_URL).await
}

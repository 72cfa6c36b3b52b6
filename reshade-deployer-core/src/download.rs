use futures_util::StreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{DeployerError, TransferError};
use crate::fs_linker::path_with_suffix;

pub const USER_AGENT: &str = "ReShade-Deployer";
const PROGRESS_INTERVAL: Duration = Duration::from_millis(150);

/// Turns byte counts into "Downloading <file>: x/y" reports, at most one per interval.
/// Completion is always reported.
struct TransferProgress<'a> {
    name: &'a str,
    total: u64,
    interval: Duration,
    last_report: Option<Instant>,
}

impl<'a> TransferProgress<'a> {
    fn new(name: &'a str, total: u64, interval: Duration) -> Self {
        Self { name, total, interval, last_report: None }
    }

    fn update(&mut self, downloaded: u64) -> Option<(String, u8)> {
        if self.total == 0 {
            return None;
        }
        let now = Instant::now();
        let complete = downloaded >= self.total;
        let due = self.last_report.map_or(true, |at| now.duration_since(at) >= self.interval);
        if !complete && !due {
            return None;
        }
        self.last_report = Some(now);
        let percent = (u128::from(downloaded.min(self.total)) * 100 / u128::from(self.total)) as u8;
        let message = format!(
            "Downloading {}: {}/{}",
            self.name,
            humansize::format_size(downloaded, humansize::DECIMAL),
            humansize::format_size(self.total, humansize::DECIMAL)
        );
        debug!(target: "progress", "{message}");
        Some((message, percent))
    }
}

/// HTTP access for page scraping, release metadata and file downloads.
#[derive(Clone, Default)]
pub struct DownloadService {
    client: Client,
}

impl DownloadService {
    pub fn new() -> Self {
        let client = Client::builder().user_agent(USER_AGENT).build().unwrap_or_default();
        Self { client }
    }

    pub async fn get_text(&self, url: &str) -> Result<String, DeployerError> {
        info!("GET {url}");
        let result: Result<String, reqwest::Error> = async {
            let resp = self.client.get(url).send().await?.error_for_status()?;
            resp.text().await
        }
        .await;
        result.map_err(|e| DeployerError::download(url, e))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DeployerError> {
        info!("GET {url}");
        let result: Result<T, reqwest::Error> = async {
            let resp = self
                .client
                .get(url)
                .header("Accept", "application/vnd.github.v3+json")
                .send()
                .await?
                .error_for_status()?;
            resp.json::<T>().await
        }
        .await;
        result.map_err(|e| DeployerError::download(url, e))
    }

    /// Stream `url` into `dest`. Data lands in `<dest>.part` first and is renamed into
    /// place only once complete. Returns the byte count.
    pub async fn download_to_file(
        &self,
        url: &str,
        dest: &Path,
        mut progress: impl FnMut(&str, u8),
    ) -> Result<u64, DeployerError> {
        let part = path_with_suffix(dest, ".part");
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| url.to_string());
        info!("Downloading {url} -> {}", dest.display());

        let result: Result<u64, TransferError> = async {
            let resp = self.client.get(url).send().await?.error_for_status()?;
            let total = resp.content_length().unwrap_or(0);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::File::create(&part).await?;
            let mut stream = resp.bytes_stream();
            let mut reports = TransferProgress::new(&name, total, PROGRESS_INTERVAL);
            let mut downloaded: u64 = 0;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                if let Some((message, percent)) = reports.update(downloaded) {
                    progress(&message, percent);
                }
            }
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&part, dest).await?;
            Ok(downloaded)
        }
        .await;

        match result {
            Ok(n) => {
                debug!("downloaded {n} bytes to {}", dest.display());
                progress(&format!("Downloaded {name}"), 100);
                Ok(n)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(DeployerError::download(url, e))
            }
        }
    }
}

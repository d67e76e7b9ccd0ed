// ─── Release Feed ───
// Resolves the latest GitHub release of a repository and streams its assets.

use std::path::Path;

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::downloader::stream_to_file;
use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseMetadata {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.tag_name.as_deref())
            .unwrap_or("latest")
    }

    /// Publication date as `YYYY-MM-DD`, when the feed carries one.
    pub fn published_on(&self) -> Option<String> {
        self.published_at.map(|at| at.format("%Y-%m-%d").to_string())
    }

    /// The asset a bootstrap run installs.
    pub fn primary_asset(&self) -> LauncherResult<&ReleaseAsset> {
        self.assets
            .first()
            .ok_or_else(|| LauncherError::NoAssets(self.display_name().to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

pub struct ReleaseFetcher {
    client: reqwest::Client,
    api_base: String,
}

impl ReleaseFetcher {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    /// Metadata of the newest published release of `owner/repo`.
    pub async fn get_latest_release(&self, owner: &str, repo: &str) -> LauncherResult<ReleaseMetadata> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            owner,
            repo
        );
        info!("Fetching latest release of {}/{}", owner, repo);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let release: ReleaseMetadata = response.json().await?;
        if release.assets.is_empty() {
            return Err(LauncherError::NoAssets(release.display_name().to_string()));
        }

        debug!(
            "Release {} has {} assets",
            release.display_name(),
            release.assets.len()
        );
        Ok(release)
    }

    /// Stream `url` into `dest`. Progress is reported only when the server
    /// announces a content length. A partial file is left for the caller.
    pub async fn download_asset(
        &self,
        url: &str,
        dest: &Path,
        on_progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> LauncherResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let streamed = stream_to_file(response, dest, url, on_progress).await?;
        info!("Downloaded {} ({} bytes)", url, streamed.bytes);
        Ok(streamed.bytes)
    }
}

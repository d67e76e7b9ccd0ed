// ─── Version Manifest ───
// Handles fetching and parsing the Mojang version manifest v2.

use serde::Deserialize;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::VersionFilter;

/// Top-level Mojang version manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(rename = "releaseTime", default)]
    pub release_time: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

/// Display category used by the version filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCategory {
    Release,
    Snapshot,
    ReleaseCandidate,
    PreRelease,
    Beta,
    Alpha,
}

impl VersionEntry {
    pub fn category(&self) -> VersionCategory {
        let id = self.id.to_ascii_lowercase();
        if id.contains("-rc") {
            return VersionCategory::ReleaseCandidate;
        }
        if id.contains("-pre") || id.contains(" pre-release") {
            return VersionCategory::PreRelease;
        }
        match self.version_type.as_str() {
            "release" => VersionCategory::Release,
            "old_beta" => VersionCategory::Beta,
            "old_alpha" => VersionCategory::Alpha,
            _ => VersionCategory::Snapshot,
        }
    }
}

impl VersionManifest {
    /// Fetch the version manifest using a shared HTTP client.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<Self> {
        info!("Fetching Minecraft version manifest...");

        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let manifest: VersionManifest = response.json().await?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Entries the filter lets through, manifest order kept.
    pub fn filtered(&self, filter: &VersionFilter) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| match v.category() {
                VersionCategory::Release => filter.show_releases,
                VersionCategory::Snapshot => filter.show_snapshots,
                VersionCategory::ReleaseCandidate => filter.show_release_candidates,
                VersionCategory::PreRelease => filter.show_pre_releases,
                VersionCategory::Beta => filter.show_betas,
                VersionCategory::Alpha => filter.show_alphas,
            })
            .collect()
    }
}

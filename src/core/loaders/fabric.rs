use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::PhaseProgress;
use crate::core::state::Endpoints;
use crate::core::version::VersionJson;

/// A loader meta service with the Fabric API shape (`/versions/loader/...`).
#[derive(Debug, Clone)]
pub struct MetaApi {
    pub name: &'static str,
    pub meta_base: String,
    /// Repository for profile libraries that name none.
    pub maven: String,
}

#[derive(Debug, Deserialize)]
struct LoaderListEntry {
    loader: LoaderBuild,
}

#[derive(Debug, Deserialize)]
struct LoaderBuild {
    version: String,
    #[serde(default)]
    stable: Option<bool>,
}

/// Installs Fabric through its meta service: the loader profile is a version
/// JSON that inherits from the base game.
pub struct FabricInstaller {
    client: reqwest::Client,
    api: MetaApi,
}

impl FabricInstaller {
    pub fn new(client: reqwest::Client, endpoints: &Endpoints) -> Self {
        Self::with_api(
            client,
            MetaApi {
                name: "Fabric",
                meta_base: endpoints.fabric_meta.clone(),
                maven: endpoints.fabric_maven.clone(),
            },
        )
    }

    pub fn with_api(client: reqwest::Client, api: MetaApi) -> Self {
        Self { client, api }
    }

    /// Newest stable loader build for `minecraft_version`.
    pub async fn latest_loader(&self, minecraft_version: &str) -> LauncherResult<String> {
        let url = format!(
            "{}/versions/loader/{}",
            self.api.meta_base.trim_end_matches('/'),
            minecraft_version
        );
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(LauncherError::LoaderApi(format!(
                "{} Meta returned {} for {}",
                self.api.name,
                resp.status(),
                url
            )));
        }

        let entries: Vec<LoaderListEntry> = resp.json().await?;
        pick_loader(&entries).ok_or_else(|| LauncherError::UnsupportedVersion {
            loader: self.api.name.to_string(),
            version: minecraft_version.to_string(),
        })
    }

    async fn fetch_profile(
        &self,
        minecraft_version: &str,
        loader_version: &str,
    ) -> LauncherResult<(String, VersionJson, String)> {
        let url = format!(
            "{}/versions/loader/{}/{}/profile/json",
            self.api.meta_base.trim_end_matches('/'),
            minecraft_version,
            loader_version
        );

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(LauncherError::LoaderApi(format!(
                "{} Meta returned {} for {}",
                self.api.name,
                resp.status(),
                url
            )));
        }

        let raw = resp.text().await?;
        let profile = VersionJson::parse(&raw)?;
        if profile.main_class.as_deref().unwrap_or("").is_empty() {
            return Err(LauncherError::LoaderApi(format!(
                "{} profile missing mainClass",
                self.api.name
            )));
        }
        let id = profile
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| {
                format!(
                    "{}-loader-{}-{}",
                    self.api.name.to_ascii_lowercase(),
                    loader_version,
                    minecraft_version
                )
            });

        Ok((id, profile, raw))
    }
}

/// First entry flagged stable; when the service has no stable flag, the first
/// version without a pre-release suffix.
fn pick_loader(entries: &[LoaderListEntry]) -> Option<String> {
    entries
        .iter()
        .find(|e| e.loader.stable == Some(true))
        .or_else(|| {
            entries
                .iter()
                .find(|e| e.loader.stable.is_none() && !e.loader.version.contains('-'))
        })
        .map(|e| e.loader.version.clone())
}

#[async_trait]
impl LoaderInstaller for FabricInstaller {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        let loader_version = self.latest_loader(ctx.minecraft_version).await?;
        info!(
            "Installing {} {} for Minecraft {}",
            self.api.name, loader_version, ctx.minecraft_version
        );

        // 1. Profile, saved as a regular version JSON
        let (id, profile, raw) = self
            .fetch_profile(ctx.minecraft_version, &loader_version)
            .await?;
        VersionJson::save_to(&raw, ctx.versions_dir, &id).await?;
        debug!("Saved {} profile as {}", self.api.name, id);

        // 2. Libraries from their declared repositories
        let entries = profile.library_downloads(ctx.libs_dir, &self.api.maven);
        let label = format!("Downloading {} libraries", self.api.name);
        let phase = PhaseProgress::begin(ctx.progress, &label, entries.len() as u64);
        ctx.downloader
            .download_all(entries, &|| phase.advance(1))
            .await?;
        phase.finish();

        info!("{} installed as {}", self.api.name, id);
        Ok(LoaderInstallResult {
            version_id: id,
            loader_version,
        })
    }
}

// ─── Version Installer ───
// Brings a version (and everything it inherits from) onto disk, then layers
// mod loaders over it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use super::manifest::VersionManifest;
use super::version_file::{VersionJson, MAX_INHERITANCE_DEPTH};
use crate::core::assets::AssetIndex;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::loaders::{InstallContext, Installer, LoaderKind};
use crate::core::progress::{PhaseProgress, ProgressSink};
use crate::core::state::Endpoints;

#[async_trait]
pub trait VersionInstaller: Send + Sync {
    /// Make `version_id` launchable: version JSONs, client jar, libraries
    /// and assets. Files already present with a matching checksum are kept.
    async fn ensure_installed(
        &self,
        version_id: &str,
        install_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> LauncherResult<()>;

    /// Install `kind` on top of `base_version_id` and return the id to launch.
    async fn install_loader(
        &self,
        kind: LoaderKind,
        base_version_id: &str,
        install_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> LauncherResult<String>;
}

/// Installs from Mojang's services and the loader metas named in [`Endpoints`].
pub struct MinecraftInstaller {
    downloader: Arc<Downloader>,
    endpoints: Endpoints,
    /// Java used to run Forge processors.
    java_path: PathBuf,
}

impl MinecraftInstaller {
    pub fn new(downloader: Arc<Downloader>, endpoints: Endpoints, java_path: PathBuf) -> Self {
        Self {
            downloader,
            endpoints,
            java_path,
        }
    }

    /// Saved JSON of `version_id`, fetched through the manifest when absent,
    /// unreadable or not matching an already loaded manifest's checksum.
    async fn version_json(
        &self,
        version_id: &str,
        versions_dir: &Path,
        manifest: &mut Option<VersionManifest>,
    ) -> LauncherResult<VersionJson> {
        let path = VersionJson::path_in(versions_dir, version_id);
        if path.is_file() {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| LauncherError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            let expected = manifest
                .as_ref()
                .and_then(|m| m.find_version(version_id))
                .and_then(|entry| entry.sha1.as_deref());
            match VersionJson::parse(&raw) {
                Ok(json) if expected.map_or(true, |sha1| sha1_matches(&raw, sha1)) => {
                    debug!("Using saved version JSON {:?}", path);
                    return Ok(json);
                }
                Ok(_) => warn!("Saved version JSON {:?} has a stale checksum, fetching again", path),
                Err(e) => warn!("Saved version JSON {:?} is unreadable ({}), fetching again", path, e),
            }
        }

        if manifest.is_none() {
            *manifest = Some(
                VersionManifest::fetch(self.downloader.client(), &self.endpoints.version_manifest)
                    .await?,
            );
        }
        let entry = manifest
            .as_ref()
            .and_then(|m| m.find_version(version_id))
            .ok_or_else(|| {
                LauncherError::Install(format!("Version {} is not in the manifest", version_id))
            })?;

        info!("Fetching version JSON for {}", version_id);
        let (version_json, raw) = VersionJson::fetch(self.downloader.client(), &entry.url).await?;
        if let Some(expected) = entry.sha1.as_deref() {
            let actual = sha1_hex(&raw);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Sha1Mismatch {
                    path,
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        VersionJson::save_to(&raw, versions_dir, version_id).await?;
        Ok(version_json)
    }
}

fn sha1_hex(raw: &str) -> String {
    hex::encode(Sha1::digest(raw.as_bytes()))
}

fn sha1_matches(raw: &str, expected: &str) -> bool {
    sha1_hex(raw).eq_ignore_ascii_case(expected)
}

#[async_trait]
impl VersionInstaller for MinecraftInstaller {
    async fn ensure_installed(
        &self,
        version_id: &str,
        install_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> LauncherResult<()> {
        let versions_dir = install_dir.join("versions");
        let libs_dir = install_dir.join("libraries");
        let assets_dir = install_dir.join("assets");

        // 1. Every JSON of the inheritsFrom chain
        let mut manifest = None;
        let mut chain: Vec<(String, VersionJson)> = Vec::new();
        let mut next = Some(version_id.to_string());
        while let Some(id) = next.take() {
            if chain.len() >= MAX_INHERITANCE_DEPTH || chain.iter().any(|(seen, _)| *seen == id) {
                return Err(LauncherError::Install(format!(
                    "inheritsFrom chain of {} is cyclic or deeper than {}",
                    version_id, MAX_INHERITANCE_DEPTH
                )));
            }
            let json = self.version_json(&id, &versions_dir, &mut manifest).await?;
            next = json.inherits_from.clone().filter(|p| !p.is_empty());
            chain.push((id, json));
        }
        let (merged, _root) = VersionJson::load_merged(&versions_dir, version_id)?;

        // 2. Client jars
        let jars: Vec<_> = chain
            .iter()
            .filter_map(|(id, json)| {
                let client = json.downloads.as_ref()?.client.as_ref()?;
                Some((id, client))
            })
            .collect();
        let phase = PhaseProgress::begin(progress, "Downloading client", jars.len() as u64);
        for (id, client) in jars {
            let dest = versions_dir.join(id).join(format!("{}.jar", id));
            self.downloader
                .ensure_file(&client.url, &dest, client.sha1.as_deref())
                .await?;
            phase.advance(1);
        }
        phase.finish();

        // 3. Libraries and native classifiers
        let entries = merged.library_downloads(&libs_dir, &self.endpoints.libraries);
        let phase = PhaseProgress::begin(progress, "Downloading libraries", entries.len() as u64);
        self.downloader
            .download_all(entries, &|| phase.advance(1))
            .await?;
        phase.finish();

        // 4. Asset index and objects
        match &merged.asset_index {
            Some(index_info) => {
                progress.set_label("Downloading assets");
                let index = AssetIndex::ensure(index_info, &assets_dir, &self.downloader).await?;
                let objects = index
                    .missing_objects(&assets_dir, &self.endpoints.resources)
                    .await?;

                let phase =
                    PhaseProgress::begin(progress, "Downloading assets", objects.len() as u64);
                self.downloader
                    .download_all(objects, &|| phase.advance(1))
                    .await?;
                phase.finish();
            }
            None => debug!("{} declares no asset index", version_id),
        }

        info!("Version {} is installed", version_id);
        Ok(())
    }

    async fn install_loader(
        &self,
        kind: LoaderKind,
        base_version_id: &str,
        install_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> LauncherResult<String> {
        let Some(installer) =
            Installer::new(kind, self.downloader.client().clone(), &self.endpoints)
        else {
            return Ok(base_version_id.to_string());
        };

        let versions_dir = install_dir.join("versions");
        let libs_dir = install_dir.join("libraries");
        let result = installer
            .install(InstallContext {
                minecraft_version: base_version_id,
                install_dir,
                versions_dir: &versions_dir,
                libs_dir: &libs_dir,
                downloader: &self.downloader,
                java_path: &self.java_path,
                progress,
            })
            .await?;

        info!(
            "{} {} ready as {}",
            kind, result.loader_version, result.version_id
        );
        Ok(result.version_id)
    }
}

// ─── Assets ───
// Asset index download and the list of hashed objects it references.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::AssetIndexInfo;

/// Top-level asset index JSON structure.
#[derive(Debug, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub objects: BTreeMap<String, AssetObject>,
}

#[derive(Debug, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetIndex {
    /// Make sure `assets/indexes/<id>.json` is present and parse it.
    pub async fn ensure(
        info: &AssetIndexInfo,
        assets_dir: &Path,
        downloader: &Downloader,
    ) -> LauncherResult<Self> {
        let index_path = assets_dir
            .join("indexes")
            .join(format!("{}.json", info.id));
        downloader
            .ensure_file(&info.url, &index_path, info.sha1.as_deref())
            .await?;

        let raw = tokio::fs::read_to_string(&index_path)
            .await
            .map_err(|e| LauncherError::Io {
                path: index_path.clone(),
                source: e,
            })?;
        let index: AssetIndex = serde_json::from_str(&raw)?;
        debug!("Asset index {} lists {} objects", info.id, index.objects.len());
        Ok(index)
    }

    /// Objects missing under `assets/objects/<hh>/<hash>`, or present with a
    /// size or SHA-1 that disagrees with the index. Runs on a blocking thread.
    pub async fn missing_objects(
        &self,
        assets_dir: &Path,
        resources_base: &str,
    ) -> LauncherResult<Vec<DownloadEntry>> {
        let mut seen = HashSet::new();
        let objects: Vec<(String, u64)> = self
            .objects
            .values()
            .filter(|obj| obj.hash.len() >= 2 && seen.insert(obj.hash.as_str()))
            .map(|obj| (obj.hash.clone(), obj.size))
            .collect();
        let unique = objects.len();
        let objects_dir = assets_dir.join("objects");
        let base = resources_base.trim_end_matches('/').to_string();

        let entries = tokio::task::spawn_blocking(move || scan_objects(&objects_dir, &base, objects))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))?;

        info!(
            "{} asset objects to download ({} already cached)",
            entries.len(),
            unique - entries.len()
        );
        Ok(entries)
    }
}

fn scan_objects(objects_dir: &Path, base: &str, objects: Vec<(String, u64)>) -> Vec<DownloadEntry> {
    objects
        .into_iter()
        .filter_map(|(hash, size)| {
            let hash_prefix = &hash[..2];
            let dest = objects_dir.join(hash_prefix).join(&hash);
            if is_cached(&dest, &hash, size) {
                return None;
            }
            Some(DownloadEntry {
                url: format!("{}/{}/{}", base, hash_prefix, hash),
                dest,
                sha1: Some(hash),
                size: Some(size),
            })
        })
        .collect()
}

fn is_cached(path: &Path, hash: &str, size: u64) -> bool {
    let len_matches = std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() == size)
        .unwrap_or(false);
    if !len_matches {
        return false;
    }
    match std::fs::read(path) {
        Ok(bytes) => hex::encode(Sha1::digest(&bytes)).eq_ignore_ascii_case(hash),
        Err(e) => {
            debug!("Could not read cached object {:?}: {}", path, e);
            false
        }
    }
}

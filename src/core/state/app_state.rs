use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::endpoints::Endpoints;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;

const APP_DIR_NAME: &str = "UnixLauncher";
const INSTALL_DIR_NAME: &str = ".unixlauncher";
const SETTINGS_FILE: &str = "launcher_settings.json";
const INSTALL_DIR_ENV: &str = "UNIXLAUNCHER_INSTALL_DIR";

/// Which manifest version types are listed to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VersionFilter {
    pub show_releases: bool,
    pub show_snapshots: bool,
    pub show_betas: bool,
    pub show_alphas: bool,
    pub show_release_candidates: bool,
    pub show_pre_releases: bool,
}

impl Default for VersionFilter {
    fn default() -> Self {
        Self {
            show_releases: true,
            show_snapshots: true,
            show_betas: true,
            show_alphas: true,
            show_release_candidates: true,
            show_pre_releases: true,
        }
    }
}

impl VersionFilter {
    pub fn releases_only() -> Self {
        Self {
            show_releases: true,
            show_snapshots: false,
            show_betas: false,
            show_alphas: false,
            show_release_candidates: false,
            show_pre_releases: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Heap size handed to the game, in megabytes.
    pub memory_mb: u32,
    pub java_path: Option<PathBuf>,
    pub versions: VersionFilter,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            memory_mb: 2048,
            java_path: None,
            versions: VersionFilter::default(),
        }
    }
}

impl LauncherSettings {
    pub fn load(data_dir: &Path) -> Self {
        load_settings_from_disk(data_dir).unwrap_or_default()
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        std::fs::create_dir_all(data_dir).map_err(|e| LauncherError::Io {
            path: data_dir.to_path_buf(),
            source: e,
        })?;
        let settings_path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&settings_path, json).map_err(|e| LauncherError::Io {
            path: settings_path,
            source: e,
        })
    }

    /// `-Xmx`/`-Xms` pair for the configured heap, capped at physical memory.
    pub fn jvm_memory_args(&self) -> Vec<String> {
        let memory = match total_memory_mb() {
            Some(total) if total > 0 => self.memory_mb.min(total),
            _ => self.memory_mb,
        };
        memory_args(memory)
    }
}

fn memory_args(memory_mb: u32) -> Vec<String> {
    if memory_mb >= 1024 {
        let gigabytes = memory_mb / 1024;
        vec![format!("-Xmx{}G", gigabytes), format!("-Xms{}G", gigabytes)]
    } else {
        vec![format!("-Xmx{}M", memory_mb), format!("-Xms{}M", memory_mb)]
    }
}

pub fn total_memory_mb() -> Option<u32> {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let bytes = system.total_memory();
    if bytes == 0 {
        return None;
    }
    u32::try_from(bytes / (1024 * 1024)).ok()
}

/// Shared services for one launcher process.
pub struct AppState {
    pub data_dir: PathBuf,
    pub install_dir: PathBuf,
    pub http_client: Client,
    pub downloader: Arc<Downloader>,
    pub endpoints: Endpoints,
    pub launcher_settings: LauncherSettings,
}

impl AppState {
    pub fn new() -> LauncherResult<Self> {
        let data_dir = default_data_dir();
        let install_dir = default_install_dir();
        let http_client = build_http_client()?;
        let downloader = Arc::new(Downloader::new(
            http_client.clone(),
            std::env::temp_dir().join(APP_DIR_NAME).join("downloads"),
        ));
        let launcher_settings = LauncherSettings::load(&data_dir);

        Ok(Self {
            data_dir,
            install_dir,
            http_client,
            downloader,
            endpoints: Endpoints::default(),
            launcher_settings,
        })
    }

    pub fn save_settings(&self) -> LauncherResult<()> {
        self.launcher_settings.save(&self.data_dir)
    }
}

fn load_settings_from_disk(data_dir: &Path) -> Option<LauncherSettings> {
    let path = data_dir.join(SETTINGS_FILE);
    let raw = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!("Ignoring malformed {:?}: {}", path, e);
            None
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Directory holding the identity record, saved username and settings.
pub fn default_data_dir() -> PathBuf {
    default_base_dir().join(APP_DIR_NAME)
}

/// Root of `versions/`, `libraries/` and `assets/`.
pub fn default_install_dir() -> PathBuf {
    match std::env::var_os(INSTALL_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default_base_dir().join(INSTALL_DIR_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_args_switch_to_gigabytes_at_1024() {
        assert_eq!(memory_args(512), vec!["-Xmx512M", "-Xms512M"]);
        assert_eq!(memory_args(1024), vec!["-Xmx1G", "-Xms1G"]);
        assert_eq!(memory_args(3072), vec!["-Xmx3G", "-Xms3G"]);
        assert_eq!(memory_args(1536), vec!["-Xmx1G", "-Xms1G"]);
    }

    #[test]
    fn settings_round_trip_through_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LauncherSettings {
            memory_mb: 4096,
            java_path: Some(PathBuf::from("/opt/jdk/bin/java")),
            versions: VersionFilter::releases_only(),
        };
        settings.save(dir.path()).unwrap();

        let loaded = LauncherSettings::load(dir.path());
        assert_eq!(loaded.memory_mb, 4096);
        assert_eq!(loaded.java_path, settings.java_path);
        assert_eq!(loaded.versions, VersionFilter::releases_only());
    }

    #[test]
    fn malformed_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ not json").unwrap();
        let loaded = LauncherSettings::load(dir.path());
        assert_eq!(loaded.memory_mb, 2048);
        assert!(loaded.java_path.is_none());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let loaded: LauncherSettings = serde_json::from_value(serde_json::json!({
            "memory_mb": 1024
        }))
        .unwrap();
        assert_eq!(loaded.memory_mb, 1024);
        assert_eq!(loaded.versions, VersionFilter::default());
    }
}

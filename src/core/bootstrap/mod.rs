// ─── Bootstrapper ───
// Acquire-and-run: fetch the newest release package, unpack it and start the
// executable inside. Skips straight to starting it when already installed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::archive;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::process::{LaunchCommand, ProcessRunner};
use crate::core::progress::ProgressSink;
use crate::core::release::ReleaseFetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub owner: String,
    pub repo: String,
    pub exe_name: String,
    pub install_dir: PathBuf,
}

impl BootstrapConfig {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            owner: "ULauncher-Github".into(),
            repo: "Unix-Launcher".into(),
            exe_name: "ULauncher.exe".into(),
            install_dir: install_dir.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub exe_path: PathBuf,
    pub pid: u32,
    /// `false` when an existing install was started.
    pub downloaded: bool,
}

pub struct Bootstrapper {
    config: BootstrapConfig,
    fetcher: ReleaseFetcher,
    runner: Arc<dyn ProcessRunner>,
}

impl Bootstrapper {
    pub fn new(config: BootstrapConfig, fetcher: ReleaseFetcher, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config,
            fetcher,
            runner,
        }
    }

    pub async fn run(&self, progress: &dyn ProgressSink) -> LauncherResult<BootstrapOutcome> {
        let cfg = &self.config;

        if let Some(exe) = archive::find_executable(&cfg.install_dir, &cfg.exe_name) {
            info!("{} already installed at {:?}", cfg.exe_name, exe);
            let pid = self.start(&exe)?;
            return Ok(BootstrapOutcome {
                exe_path: exe,
                pid,
                downloaded: false,
            });
        }

        let release = self.fetcher.get_latest_release(&cfg.owner, &cfg.repo).await?;
        let asset = release.primary_asset()?;
        info!(
            "Latest release: {} (published {}), asset {}",
            release.display_name(),
            release.published_on().as_deref().unwrap_or("unknown"),
            asset.name
        );

        tokio::fs::create_dir_all(&cfg.install_dir)
            .await
            .map_err(|e| LauncherError::Io {
                path: cfg.install_dir.clone(),
                source: e,
            })?;
        let temp = tempfile::Builder::new()
            .prefix("unixlauncher-bootstrap")
            .tempdir()
            .map_err(|e| LauncherError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;

        let result = self.install_and_start(&asset.download_url, &asset.name, temp.path(), progress).await;

        let temp_path = temp.path().to_path_buf();
        if let Err(e) = temp.close() {
            warn!("Could not remove temp dir {:?}: {}", temp_path, e);
        }
        result
    }

    async fn install_and_start(
        &self,
        url: &str,
        asset_name: &str,
        temp_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> LauncherResult<BootstrapOutcome> {
        let cfg = &self.config;
        let file_name = Path::new(asset_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "package.zip".into());
        let package = temp_dir.join(file_name);

        progress.set_label(&format!("Downloading {}", asset_name));
        progress.set_value(0);
        progress.set_max(0);
        let mut on_progress = |done: u64, total: u64| {
            progress.set_max(total);
            progress.set_value(done.min(total));
        };
        if let Err(e) = self.fetcher.download_asset(url, &package, &mut on_progress).await {
            if let Err(rm) = tokio::fs::remove_file(&package).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove partial download {:?}: {}", package, rm);
                }
            }
            return Err(e);
        }

        progress.set_label("Extracting");
        progress.set_value(0);
        progress.set_max(0);
        let mut on_extract = |done: u64, total: u64| {
            progress.set_max(total);
            progress.set_value(done.min(total));
        };
        let entries = archive::extract(&package, &cfg.install_dir, &mut on_extract).await?;
        info!("Extracted {} entries into {:?}", entries, cfg.install_dir);

        let exe = archive::find_executable(&cfg.install_dir, &cfg.exe_name).ok_or_else(|| {
            LauncherError::Install(format!(
                "{} not found in the extracted package",
                cfg.exe_name
            ))
        })?;
        let pid = self.start(&exe)?;
        Ok(BootstrapOutcome {
            exe_path: exe,
            pid,
            downloaded: true,
        })
    }

    fn start(&self, exe: &Path) -> LauncherResult<u32> {
        let working_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.install_dir.clone());
        self.runner.start(&LaunchCommand {
            program: exe.to_path_buf(),
            args: Vec::new(),
            working_dir,
            hide_console: false,
        })
    }
}

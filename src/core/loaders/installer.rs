use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::LauncherResult;
use crate::core::state::Endpoints;

use super::{context::InstallContext, fabric::FabricInstaller, forge::ForgeInstaller, quilt::QuiltInstaller};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    #[default]
    None,
    Forge,
    Fabric,
    Quilt,
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoaderKind::None => "none",
            LoaderKind::Forge => "forge",
            LoaderKind::Fabric => "fabric",
            LoaderKind::Quilt => "quilt",
        })
    }
}

impl FromStr for LoaderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "vanilla" => Ok(LoaderKind::None),
            "forge" => Ok(LoaderKind::Forge),
            "fabric" => Ok(LoaderKind::Fabric),
            "quilt" => Ok(LoaderKind::Quilt),
            other => Err(format!("unknown loader '{}'", other)),
        }
    }
}

/// Version a loader install produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderInstallResult {
    /// Id of the saved `versions/<id>/<id>.json`, the new launch target.
    pub version_id: String,
    pub loader_version: String,
}

#[async_trait]
pub trait LoaderInstaller: Send + Sync {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult>;
}

/// Dispatcher without `Box<dyn>`.
pub enum Installer {
    Fabric(FabricInstaller),
    Quilt(QuiltInstaller),
    Forge(ForgeInstaller),
}

impl Installer {
    /// `None` for [`LoaderKind::None`].
    pub fn new(kind: LoaderKind, client: reqwest::Client, endpoints: &Endpoints) -> Option<Self> {
        match kind {
            LoaderKind::None => None,
            LoaderKind::Fabric => Some(Self::Fabric(FabricInstaller::new(client, endpoints))),
            LoaderKind::Quilt => Some(Self::Quilt(QuiltInstaller::new(client, endpoints))),
            LoaderKind::Forge => Some(Self::Forge(ForgeInstaller::new(client, endpoints))),
        }
    }

    pub async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        match self {
            Installer::Fabric(i) => i.install(ctx).await,
            Installer::Quilt(i) => i.install(ctx).await,
            Installer::Forge(i) => i.install(ctx).await,
        }
    }
}

use async_trait::async_trait;

use super::context::InstallContext;
use super::fabric::{FabricInstaller, MetaApi};
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::LauncherResult;
use crate::core::state::Endpoints;

/// Installs Quilt loader via the Quilt Meta API (nearly identical to Fabric's API).
pub struct QuiltInstaller {
    inner: FabricInstaller,
}

impl QuiltInstaller {
    pub fn new(client: reqwest::Client, endpoints: &Endpoints) -> Self {
        Self {
            inner: FabricInstaller::with_api(
                client,
                MetaApi {
                    name: "Quilt",
                    meta_base: endpoints.quilt_meta.clone(),
                    maven: endpoints.quilt_maven.clone(),
                },
            ),
        }
    }

    pub async fn latest_loader(&self, minecraft_version: &str) -> LauncherResult<String> {
        self.inner.latest_loader(minecraft_version).await
    }
}

#[async_trait]
impl LoaderInstaller for QuiltInstaller {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        self.inner.install(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::TestServer;

    #[tokio::test]
    async fn queries_quilt_meta_v3() {
        let server = TestServer::start()
            .json_route(
                "/quilt/v3/versions/loader/1.20.1",
                serde_json::json!([
                    {"loader": {"version": "0.26.1-beta.2", "maven": "org.quiltmc:quilt-loader:0.26.1-beta.2"}},
                    {"loader": {"version": "0.26.0", "maven": "org.quiltmc:quilt-loader:0.26.0"}}
                ]),
            )
            .spawn()
            .await;
        let installer = QuiltInstaller::new(reqwest::Client::new(), &Endpoints::local(&server.base()));

        assert_eq!(installer.latest_loader("1.20.1").await.unwrap(), "0.26.0");
        assert_eq!(server.hits("/quilt/v3/versions/loader/1.20.1"), 1);
    }
}

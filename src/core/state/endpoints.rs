use serde::{Deserialize, Serialize};

use crate::core::maven::{FABRIC_MAVEN, FORGE_MAVEN, MOJANG_LIBRARIES, QUILT_MAVEN};

/// Base URLs of every remote service the launcher talks to.
///
/// Production hosts by default; tests point them at a local server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub github_api: String,
    pub version_manifest: String,
    pub resources: String,
    pub libraries: String,
    pub fabric_meta: String,
    pub fabric_maven: String,
    pub quilt_meta: String,
    pub quilt_maven: String,
    pub forge_maven: String,
    pub xbox_user_auth: String,
    pub xsts_auth: String,
    pub minecraft_services: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github_api: "https://api.github.com".into(),
            version_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json"
                .into(),
            resources: "https://resources.download.minecraft.net".into(),
            libraries: MOJANG_LIBRARIES.into(),
            fabric_meta: "https://meta.fabricmc.net/v2".into(),
            fabric_maven: FABRIC_MAVEN.into(),
            quilt_meta: "https://meta.quiltmc.org/v3".into(),
            quilt_maven: QUILT_MAVEN.into(),
            forge_maven: FORGE_MAVEN.into(),
            xbox_user_auth: "https://user.auth.xboxlive.com".into(),
            xsts_auth: "https://xsts.auth.xboxlive.com".into(),
            minecraft_services: "https://api.minecraftservices.com".into(),
        }
    }
}

impl Endpoints {
    /// Every host replaced by `base`, keeping the production paths below it.
    #[cfg(test)]
    pub fn local(base: &str) -> Self {
        Self {
            github_api: base.into(),
            version_manifest: format!("{}/mc/game/version_manifest_v2.json", base),
            resources: format!("{}/resources", base),
            libraries: format!("{}/libraries", base),
            fabric_meta: format!("{}/fabric/v2", base),
            fabric_maven: format!("{}/fabric-maven", base),
            quilt_meta: format!("{}/quilt/v3", base),
            quilt_maven: format!("{}/quilt-maven", base),
            forge_maven: format!("{}/forge-maven", base),
            xbox_user_auth: format!("{}/xbl", base),
            xsts_auth: format!("{}/xsts", base),
            minecraft_services: format!("{}/mc", base),
        }
    }
}

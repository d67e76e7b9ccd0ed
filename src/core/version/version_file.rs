// ─── Version File ───
// Parses a Mojang version JSON, evaluates OS rules for libraries and arguments,
// and resolves `inheritsFrom` chains.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::core::downloader::DownloadEntry;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;

/// Longest `inheritsFrom` chain that is followed.
pub const MAX_INHERITANCE_DEPTH: usize = 8;

/// A fully parsed Mojang version JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    pub id: Option<String>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub inherits_from: Option<String>,
    /// Version whose client jar this one runs on.
    #[serde(default)]
    pub jar: Option<String>,
    #[serde(rename = "type", default)]
    pub version_type: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    /// Asset index id for versions that predate `assetIndex`.
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    /// Legacy `minecraftArguments` field (pre-1.13).
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub java_version: Option<JavaVersionInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    pub client: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub total_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<serde_json::Value>,
    #[serde(default)]
    pub jvm: Vec<serde_json::Value>,
}

// ─── Library Entry with Rules ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
    #[serde(default)]
    pub natives: Option<serde_json::Value>,
    /// Maven repository base for loader libraries without `downloads`.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    pub artifact: Option<LibDownloadArtifact>,
    #[serde(default)]
    pub classifiers: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibDownloadArtifact {
    pub path: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: String,
}

// ─── OS Rule Evaluation ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

impl OsRule {
    fn matches_current(&self) -> bool {
        let name_ok = self.name.as_deref().map_or(true, |n| n == current_os_name());
        let arch_ok = self.arch.as_deref().map_or(true, |a| a == current_arch_name());
        name_ok && arch_ok
    }
}

impl LibraryEntry {
    /// Evaluate whether this library should be included for the current OS.
    ///
    /// Rules logic:
    /// - If no rules → allowed.
    /// - Process rules top-to-bottom. Start with "disallowed".
    /// - Each rule either sets "allow" or "disallow" if the OS matches (or if no OS is specified).
    /// - Final state determines inclusion.
    pub fn is_allowed_for_current_os(&self) -> bool {
        let rules = match &self.rules {
            Some(r) => r,
            None => return true,
        };

        let mut allowed = false;
        for rule in rules {
            let os_matches = rule.os.as_ref().map_or(true, OsRule::matches_current);
            if os_matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }
        allowed
    }

    /// Check if this library has native classifiers for the current OS.
    pub fn native_classifier_for_current_os(&self) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let os = current_os_name();
        natives.as_object()?.get(os)?.as_str().map(|s| {
            let arch = if cfg!(target_pointer_width = "64") {
                "64"
            } else {
                "32"
            };
            s.replace("${arch}", arch)
        })
    }

    /// Path of the main jar relative to `libraries/`.
    pub fn artifact_path(&self) -> Option<PathBuf> {
        if let Some(downloads) = &self.downloads {
            return downloads
                .artifact
                .as_ref()
                .map(|a| a.path.split('/').collect());
        }
        MavenArtifact::parse(&self.name).ok().map(|a| a.local_path())
    }

    /// Where the main jar comes from. `None` for native-only entries and for
    /// jars that an installer produces locally (empty url).
    pub fn artifact_download(&self, libs_dir: &Path, default_repo: &str) -> Option<DownloadEntry> {
        if let Some(downloads) = &self.downloads {
            let artifact = downloads.artifact.as_ref()?;
            if artifact.url.is_empty() {
                return None;
            }
            return Some(DownloadEntry {
                url: artifact.url.clone(),
                dest: libs_dir.join(&artifact.path),
                sha1: artifact.sha1.clone(),
                size: artifact.size,
            });
        }

        let coord = match MavenArtifact::parse(&self.name) {
            Ok(coord) => coord,
            Err(e) => {
                debug!("Skipping library with unusable name: {}", e);
                return None;
            }
        };
        let repo = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(default_repo);
        Some(DownloadEntry {
            url: coord.url(repo),
            dest: libs_dir.join(coord.local_path()),
            sha1: None,
            size: None,
        })
    }

    /// Native classifier jar for this platform, if any.
    pub fn native_download(&self, libs_dir: &Path) -> Option<DownloadEntry> {
        let classifier = self.native_classifier_for_current_os()?;
        let info = self
            .downloads
            .as_ref()?
            .classifiers
            .as_ref()?
            .get(&classifier)?;

        let url = info.get("url")?.as_str()?;
        let path = info.get("path")?.as_str()?;
        Some(DownloadEntry {
            url: url.to_string(),
            dest: libs_dir.join(path),
            sha1: info.get("sha1").and_then(|v| v.as_str()).map(str::to_string),
            size: info.get("size").and_then(|v| v.as_u64()),
        })
    }
}

/// Get the Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn current_arch_name() -> &'static str {
    if cfg!(target_arch = "x86") {
        "x86"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "x86_64"
    }
}

impl VersionJson {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Fetch a version JSON, returning the parsed form and the raw text.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<(Self, String)> {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let raw = response.text().await?;
        let version_json = Self::parse(&raw)?;
        Ok((version_json, raw))
    }

    /// `versions/<id>/<id>.json` under `versions_dir`.
    pub fn path_in(versions_dir: &Path, version_id: &str) -> PathBuf {
        versions_dir
            .join(version_id)
            .join(format!("{}.json", version_id))
    }

    /// Save the raw version JSON as `versions/<id>/<id>.json`.
    pub async fn save_to(raw_json: &str, versions_dir: &Path, version_id: &str) -> LauncherResult<()> {
        let path = Self::path_in(versions_dir, version_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        // staged beside the target, then renamed over it
        let staged = path.with_extension("json.part");
        tokio::fs::write(&staged, raw_json)
            .await
            .map_err(|e| LauncherError::Io {
                path: staged.clone(),
                source: e,
            })?;
        if let Err(e) = tokio::fs::rename(&staged, &path).await {
            if let Err(rm) = tokio::fs::remove_file(&staged).await {
                debug!("Could not remove {:?}: {}", staged, rm);
            }
            return Err(LauncherError::Io { path, source: e });
        }
        Ok(())
    }

    /// Read the saved JSON of `version_id` and fold its ancestors into it.
    ///
    /// Returns the merged version and the id of the chain's root, which owns
    /// the client jar.
    pub fn load_merged(versions_dir: &Path, version_id: &str) -> LauncherResult<(Self, String)> {
        let (merged, root) = load_merged_value(versions_dir, version_id, 0)?;
        Ok((serde_json::from_value(merged)?, root))
    }

    /// Id whose `versions/<id>/<id>.jar` goes on the classpath.
    pub fn client_jar_id(&self, chain_root: &str) -> String {
        self.jar
            .clone()
            .filter(|j| !j.trim().is_empty())
            .unwrap_or_else(|| chain_root.to_string())
    }

    /// Asset index id, `legacy` when the version names none.
    pub fn asset_index_id(&self) -> String {
        self.asset_index
            .as_ref()
            .map(|a| a.id.clone())
            .or_else(|| self.assets.clone())
            .unwrap_or_else(|| "legacy".to_string())
    }

    /// Every library and native jar to fetch for this platform.
    pub fn library_downloads(&self, libs_dir: &Path, default_repo: &str) -> Vec<DownloadEntry> {
        let mut entries = Vec::new();
        for lib in &self.libraries {
            if !lib.is_allowed_for_current_os() {
                debug!("Skipping library (OS rule): {}", lib.name);
                continue;
            }
            entries.extend(lib.artifact_download(libs_dir, default_repo));
            entries.extend(lib.native_download(libs_dir));
        }
        entries
    }

    /// Classpath jars of allowed libraries, first occurrence wins.
    pub fn classpath_libraries(&self, libs_dir: &Path) -> Vec<PathBuf> {
        let mut seen = std::collections::HashSet::new();
        self.libraries
            .iter()
            .filter(|lib| lib.is_allowed_for_current_os())
            .filter(|lib| {
                // native-only entries of old versions carry no main jar
                !(lib.natives.is_some()
                    && lib.downloads.as_ref().is_some_and(|d| d.artifact.is_none()))
            })
            .filter_map(|lib| lib.artifact_path())
            .map(|rel| libs_dir.join(rel))
            .filter(|path| seen.insert(path.clone()))
            .collect()
    }

    /// Native classifier jars to unpack before launch.
    pub fn native_jars(&self, libs_dir: &Path) -> Vec<PathBuf> {
        self.libraries
            .iter()
            .filter(|lib| lib.is_allowed_for_current_os())
            .filter_map(|lib| lib.native_download(libs_dir))
            .map(|entry| entry.dest)
            .collect()
    }

    pub fn required_java_major(&self) -> u32 {
        self.java_version
            .as_ref()
            .map(|j| j.major_version)
            .unwrap_or(8)
    }

    /// Game arguments with rules evaluated.
    pub fn simple_game_args(&self) -> Vec<String> {
        match &self.arguments {
            Some(args) if !args.game.is_empty() => {
                args.game.iter().flat_map(extract_argument_values).collect()
            }
            _ => match &self.minecraft_arguments {
                Some(s) => s.split_whitespace().map(|s| s.to_string()).collect(),
                None => vec![],
            },
        }
    }

    /// JVM arguments with rules evaluated; empty for legacy versions.
    pub fn simple_jvm_args(&self) -> Vec<String> {
        match &self.arguments {
            Some(args) => args.jvm.iter().flat_map(extract_argument_values).collect(),
            None => vec![],
        }
    }

    pub fn has_modern_jvm_args(&self) -> bool {
        self.arguments.as_ref().is_some_and(|a| !a.jvm.is_empty())
    }

    /// Merge `current_json` over `parent_json`.
    ///
    /// Child keys override, `libraries` become child + parent and
    /// `arguments.game`/`arguments.jvm` become parent + child.
    pub fn merge_with_parent_json(
        current_json: &serde_json::Value,
        parent_json: &serde_json::Value,
    ) -> serde_json::Value {
        let mut merged = parent_json.clone();

        let Some(obj) = current_json.as_object() else {
            return merged;
        };

        for (k, v) in obj {
            match k.as_str() {
                "libraries" => {
                    let mut libraries = v.as_array().cloned().unwrap_or_default();
                    if let Some(parent_libs) = parent_json.get("libraries").and_then(|l| l.as_array()) {
                        libraries.extend(parent_libs.iter().cloned());
                    }
                    merged[k] = serde_json::Value::Array(libraries);
                }
                "arguments" => {
                    let mut arguments = parent_json
                        .get("arguments")
                        .cloned()
                        .filter(|a| a.is_object())
                        .unwrap_or_else(|| serde_json::json!({}));
                    for side in ["game", "jvm"] {
                        let mut values = arguments
                            .get(side)
                            .and_then(|a| a.as_array())
                            .cloned()
                            .unwrap_or_default();
                        if let Some(child) = v.get(side).and_then(|a| a.as_array()) {
                            values.extend(child.iter().cloned());
                        }
                        arguments[side] = serde_json::Value::Array(values);
                    }
                    merged[k] = arguments;
                }
                _ => merged[k] = v.clone(),
            }
        }

        merged
    }
}

fn load_merged_value(
    versions_dir: &Path,
    version_id: &str,
    depth: usize,
) -> LauncherResult<(serde_json::Value, String)> {
    if depth >= MAX_INHERITANCE_DEPTH {
        return Err(LauncherError::Install(format!(
            "inheritsFrom chain of {} is deeper than {}",
            version_id, MAX_INHERITANCE_DEPTH
        )));
    }

    let path = VersionJson::path_in(versions_dir, version_id);
    let raw = std::fs::read_to_string(&path).map_err(|e| LauncherError::Io {
        path: path.clone(),
        source: e,
    })?;
    let current: serde_json::Value = serde_json::from_str(&raw)?;

    let parent_id = current
        .get("inheritsFrom")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    match parent_id {
        None => Ok((current, version_id.to_string())),
        Some(parent_id) => {
            let (parent, root) = load_merged_value(versions_dir, &parent_id, depth + 1)?;
            let mut merged = VersionJson::merge_with_parent_json(&current, &parent);
            if let Some(obj) = merged.as_object_mut() {
                obj.remove("inheritsFrom");
            }
            Ok((merged, root))
        }
    }
}

fn extract_argument_values(value: &serde_json::Value) -> Vec<String> {
    if let Some(arg) = value.as_str() {
        return vec![arg.to_string()];
    }

    let Some(obj) = value.as_object() else {
        return vec![];
    };

    if let Some(rules) = obj.get("rules").and_then(|r| r.as_array()) {
        if !rules_allow_current_os(rules) {
            return vec![];
        }
    }

    match obj.get("value") {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        _ => vec![],
    }
}

fn rules_allow_current_os(rules: &[serde_json::Value]) -> bool {
    let mut allowed = false;

    for rule in rules {
        // no launcher features (demo, custom resolution, quick play) are enabled
        if rule.get("features").is_some() {
            continue;
        }

        let action = rule
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("disallow");

        let os_matches = match rule.get("os") {
            None => true,
            Some(os) => match serde_json::from_value::<OsRule>(os.clone()) {
                Ok(os) => os.matches_current(),
                Err(_) => false,
            },
        };

        if os_matches {
            allowed = action == "allow";
        }
    }

    allowed
}

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::{MavenArtifact, MavenMetadata};
use crate::core::progress::PhaseProgress;
use crate::core::state::Endpoints;
use crate::core::version::{LibraryEntry, VersionJson};

/// Installs Forge by unpacking the official installer JAR and running its
/// client processors.
pub struct ForgeInstaller {
    client: reqwest::Client,
    maven_base: String,
}

/// Subset of Forge's `install_profile.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgeInstallProfile {
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub processors: Vec<ForgeProcessor>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ForgeProcessor {
    #[serde(default)]
    pub sides: Option<Vec<String>>,
    pub jar: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub outputs: HashMap<String, String>,
}

impl ForgeProcessor {
    fn runs_on_client(&self) -> bool {
        self.sides
            .as_ref()
            .map_or(true, |sides| sides.iter().any(|s| s == "client"))
    }
}

impl ForgeInstaller {
    pub fn new(client: reqwest::Client, endpoints: &Endpoints) -> Self {
        Self {
            client,
            maven_base: endpoints.forge_maven.trim_end_matches('/').to_string(),
        }
    }

    /// Newest Forge build for `minecraft_version`, e.g. `1.20.1-47.2.0`.
    pub async fn find_build(&self, minecraft_version: &str) -> LauncherResult<String> {
        let url = format!(
            "{}/net/minecraftforge/forge/maven-metadata.xml",
            self.maven_base
        );
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(LauncherError::LoaderApi(format!(
                "Forge maven returned {} for {}",
                resp.status(),
                url
            )));
        }
        let metadata = MavenMetadata::parse(&resp.text().await?)?;

        metadata
            .versions()
            .iter()
            .find(|v| v.split('-').next() == Some(minecraft_version))
            .cloned()
            .ok_or_else(|| LauncherError::UnsupportedVersion {
                loader: "Forge".into(),
                version: minecraft_version.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl LoaderInstaller for ForgeInstaller {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        let build = self.find_build(ctx.minecraft_version).await?;
        info!("Installing Forge {} for MC {}", build, ctx.minecraft_version);

        let work_dir = tempfile::Builder::new()
            .prefix("forge-installer")
            .tempdir()
            .map_err(|e| LauncherError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;

        // 1. Installer jar
        let installer_name = format!("forge-{}-installer.jar", build);
        let installer_url = format!(
            "{}/net/minecraftforge/forge/{}/{}",
            self.maven_base, build, installer_name
        );
        let installer_path = work_dir.path().join(&installer_name);
        ctx.downloader
            .download_file(&installer_url, &installer_path, None)
            .await?;

        let installer_bytes =
            tokio::fs::read(&installer_path)
                .await
                .map_err(|e| LauncherError::Io {
                    path: installer_path.clone(),
                    source: e,
                })?;
        let (install_profile, version_raw) = read_installer_profiles(&installer_path, &installer_bytes)?;
        let version_json = VersionJson::parse(&version_raw)?;
        let version_id = version_json
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| build.clone());

        // 2. Bundled maven/ artifacts
        let bundled = extract_bundled_maven(&installer_bytes, ctx.libs_dir)?;
        debug!("Copied {} bundled Forge artifacts", bundled);

        // 3. Remaining libraries
        let mut entries = install_profile
            .libraries
            .iter()
            .chain(version_json.libraries.iter())
            .filter(|lib| lib.is_allowed_for_current_os())
            .filter_map(|lib| lib.artifact_download(ctx.libs_dir, &self.maven_base))
            .collect::<Vec<_>>();
        let mut seen = std::collections::HashSet::new();
        entries.retain(|e| seen.insert(e.dest.clone()));

        let phase = PhaseProgress::begin(
            ctx.progress,
            "Downloading Forge libraries",
            entries.len() as u64,
        );
        ctx.downloader
            .download_all(entries, &|| phase.advance(1))
            .await?;
        phase.finish();

        // 4. Version JSON under its own id
        VersionJson::save_to(&version_raw, ctx.versions_dir, &version_id).await?;

        // 5. Client processors
        run_processors(
            &ctx,
            &installer_bytes,
            &installer_path,
            work_dir.path(),
            &install_profile,
        )
        .await?;

        if let Err(e) = work_dir.close() {
            tracing::warn!("Could not remove Forge work dir: {}", e);
        }

        info!("Forge {} installed as {}", build, version_id);
        Ok(LoaderInstallResult {
            version_id,
            loader_version: build,
        })
    }
}

/// `install_profile.json` and the raw `version.json` of a modern installer.
fn read_installer_profiles(
    installer_path: &Path,
    installer_bytes: &[u8],
) -> LauncherResult<(ForgeInstallProfile, String)> {
    let cursor = std::io::Cursor::new(installer_bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|e| LauncherError::CorruptArchive {
        path: installer_path.to_path_buf(),
        message: e.to_string(),
    })?;

    let install_profile: ForgeInstallProfile = {
        let file = archive.by_name("install_profile.json").map_err(|e| {
            LauncherError::Install(format!("Missing install_profile.json: {}", e))
        })?;
        serde_json::from_reader(file)?
    };

    let version_raw = {
        let mut file = archive.by_name("version.json").map_err(|_| {
            LauncherError::Install(
                "Legacy Forge installer without version.json is not supported".into(),
            )
        })?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)?;
        raw
    };

    Ok((install_profile, version_raw))
}

/// Copy every `maven/...` entry of the installer into `libs_dir`.
fn extract_bundled_maven(installer_bytes: &[u8], libs_dir: &Path) -> LauncherResult<usize> {
    let cursor = std::io::Cursor::new(installer_bytes);
    let mut archive = zip::ZipArchive::new(cursor)?;
    let mut copied = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let Some(rel) = file
            .enclosed_name()
            .and_then(|p| p.strip_prefix("maven").ok().map(Path::to_path_buf))
        else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }

        let dest = libs_dir.join(rel);
        if dest.metadata().map(|m| m.len() == file.size()).unwrap_or(false) {
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut out = std::fs::File::create(&dest).map_err(|e| LauncherError::Io {
            path: dest.clone(),
            source: e,
        })?;
        std::io::copy(&mut file, &mut out)?;
        copied += 1;
    }

    Ok(copied)
}

async fn run_processors(
    ctx: &InstallContext<'_>,
    installer_bytes: &[u8],
    installer_path: &Path,
    work_dir: &Path,
    install_profile: &ForgeInstallProfile,
) -> LauncherResult<()> {
    let processors: Vec<&ForgeProcessor> = install_profile
        .processors
        .iter()
        .filter(|p| p.runs_on_client())
        .collect();
    if processors.is_empty() {
        return Ok(());
    }

    let mut variables = HashMap::new();
    merge_profile_data_variables(
        &mut variables,
        &install_profile.data,
        installer_bytes,
        work_dir,
        ctx.libs_dir,
    )?;
    variables.extend(runtime_processor_variables(ctx, installer_path));

    let phase = PhaseProgress::begin(
        ctx.progress,
        "Running Forge processors",
        processors.len() as u64,
    );

    for processor in processors {
        if outputs_present(processor, &variables, ctx.libs_dir)? {
            debug!("Skipping Forge processor {}: outputs present", processor.jar);
            phase.advance(1);
            continue;
        }

        let processor_jar_path = ctx
            .libs_dir
            .join(MavenArtifact::parse(&processor.jar)?.local_path());
        if !processor_jar_path.exists() {
            return Err(LauncherError::Install(format!(
                "Missing Forge processor JAR: {}",
                processor_jar_path.display()
            )));
        }

        let mut classpath_entries = vec![processor_jar_path.to_string_lossy().to_string()];
        for cp in &processor.classpath {
            let cp_path = ctx.libs_dir.join(MavenArtifact::parse(cp)?.local_path());
            if cp_path.exists() {
                classpath_entries.push(cp_path.to_string_lossy().to_string());
            }
        }

        let classpath = classpath_entries.join(if cfg!(windows) { ";" } else { ":" });
        let main_class = read_main_class_from_jar(&processor_jar_path)?;
        let args = processor
            .args
            .iter()
            .map(|arg| resolve_processor_arg(arg, &variables, ctx.libs_dir))
            .collect::<LauncherResult<Vec<_>>>()?;

        info!(
            "Running Forge processor {} with main class {}",
            processor.jar, main_class
        );

        let output = tokio::process::Command::new(ctx.java_path)
            .arg("-cp")
            .arg(&classpath)
            .arg(&main_class)
            .args(&args)
            .current_dir(ctx.install_dir)
            .output()
            .await
            .map_err(|e| LauncherError::Install(format!("Could not run {:?}: {}", ctx.java_path, e)))?;

        if !output.status.success() {
            return Err(LauncherError::Install(format!(
                "Forge processor {} failed (code {:?})\nSTDERR:\n{}",
                processor.jar,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        phase.advance(1);
    }

    phase.finish();
    Ok(())
}

fn runtime_processor_variables(
    ctx: &InstallContext<'_>,
    installer_path: &Path,
) -> HashMap<String, String> {
    let minecraft_jar = ctx
        .versions_dir
        .join(ctx.minecraft_version)
        .join(format!("{}.jar", ctx.minecraft_version));

    HashMap::from([
        ("SIDE".to_string(), "client".to_string()),
        (
            "MINECRAFT_JAR".to_string(),
            minecraft_jar.to_string_lossy().to_string(),
        ),
        (
            "MINECRAFT_VERSION".to_string(),
            ctx.minecraft_version.to_string(),
        ),
        (
            "LIBRARY_DIR".to_string(),
            ctx.libs_dir.to_string_lossy().to_string(),
        ),
        (
            "INSTALLER".to_string(),
            installer_path.to_string_lossy().to_string(),
        ),
        (
            "ROOT".to_string(),
            ctx.install_dir.to_string_lossy().to_string(),
        ),
    ])
}

/// Client values of the profile `data` block.
///
/// `[coord]` becomes a library path, `'text'` a literal and `/path` a file
/// extracted from the installer into `work_dir`.
fn merge_profile_data_variables(
    vars: &mut HashMap<String, String>,
    data: &serde_json::Value,
    installer_bytes: &[u8],
    work_dir: &Path,
    libs_dir: &Path,
) -> LauncherResult<()> {
    let Some(obj) = data.as_object() else {
        return Ok(());
    };

    for (key, value) in obj {
        let Some(raw) = value
            .get("client")
            .and_then(|v| v.as_str())
            .or_else(|| value.as_str())
        else {
            continue;
        };

        let resolved = if let Some(coord) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            libs_dir
                .join(MavenArtifact::parse(coord)?.local_path())
                .to_string_lossy()
                .to_string()
        } else if let Some(literal) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            literal.to_string()
        } else if raw.starts_with('/') {
            extract_installer_file(installer_bytes, raw, work_dir)?
                .to_string_lossy()
                .to_string()
        } else {
            raw.to_string()
        };

        vars.insert(key.clone(), resolved);
    }

    Ok(())
}

fn extract_installer_file(
    installer_bytes: &[u8],
    entry_name: &str,
    work_dir: &Path,
) -> LauncherResult<PathBuf> {
    let cursor = std::io::Cursor::new(installer_bytes);
    let mut archive = zip::ZipArchive::new(cursor)?;
    let name = entry_name.trim_start_matches('/');
    let mut file = archive.by_name(name).map_err(|e| {
        LauncherError::Install(format!("Forge installer lacks {}: {}", entry_name, e))
    })?;

    let target = work_dir.join(name);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let mut out = std::fs::File::create(&target).map_err(|e| LauncherError::Io {
        path: target.clone(),
        source: e,
    })?;
    std::io::copy(&mut file, &mut out)?;
    Ok(target)
}

fn outputs_present(
    processor: &ForgeProcessor,
    vars: &HashMap<String, String>,
    libs_dir: &Path,
) -> LauncherResult<bool> {
    if processor.outputs.is_empty() {
        return Ok(false);
    }
    for key in processor.outputs.keys() {
        let path = resolve_processor_arg(key, vars, libs_dir)?;
        if !Path::new(&path).is_file() {
            return Ok(false);
        }
    }
    Ok(true)
}

fn resolve_processor_arg(
    arg: &str,
    vars: &HashMap<String, String>,
    libs_dir: &Path,
) -> LauncherResult<String> {
    let mut out = arg.to_string();

    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }

    if let Some(coord) = out.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let artifact = MavenArtifact::parse(coord)?;
        out = libs_dir
            .join(artifact.local_path())
            .to_string_lossy()
            .to_string();
    }

    Ok(out)
}

fn read_main_class_from_jar(path: &Path) -> LauncherResult<String> {
    let file = std::fs::File::open(path).map_err(|e| LauncherError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut manifest = archive.by_name("META-INF/MANIFEST.MF").map_err(|e| {
        LauncherError::Install(format!("Manifest not found in {}: {}", path.display(), e))
    })?;

    let mut text = String::new();
    manifest.read_to_string(&mut text)?;

    let mut main_class: Option<String> = None;
    let mut current_key: Option<String> = None;
    for line in text.lines() {
        // continuation lines start with a single space
        if let Some(rest) = line.strip_prefix(' ') {
            if current_key.as_deref() == Some("Main-Class") {
                if let Some(value) = &mut main_class {
                    value.push_str(rest.trim_end());
                }
            }
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            current_key = Some(key.trim().to_string());
            if key.trim() == "Main-Class" {
                main_class = Some(value.trim().to_string());
            }
        }
    }

    main_class.ok_or_else(|| {
        LauncherError::Install(format!(
            "Main-Class missing in processor jar {}",
            path.display()
        ))
    })
}

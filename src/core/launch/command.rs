// ─── Launch Command ───
// Turns a merged version JSON plus an identity into the java invocation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::auth::LaunchOptions;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java;
use crate::core::process::LaunchCommand;
use crate::core::state::LauncherSettings;
use crate::core::version::VersionJson;

pub const LAUNCHER_NAME: &str = "UnixLauncher";

#[async_trait]
pub trait CommandBuilder: Send + Sync {
    async fn build(
        &self,
        version_id: &str,
        install_dir: &Path,
        options: &LaunchOptions,
    ) -> LauncherResult<LaunchCommand>;
}

/// Builds `java [memory] [jvm args] -cp <classpath> <main class> [game args]`.
pub struct JavaCommandBuilder {
    settings: LauncherSettings,
}

impl JavaCommandBuilder {
    pub fn new(settings: LauncherSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CommandBuilder for JavaCommandBuilder {
    async fn build(
        &self,
        version_id: &str,
        install_dir: &Path,
        options: &LaunchOptions,
    ) -> LauncherResult<LaunchCommand> {
        let versions_dir = install_dir.join("versions");
        let libs_dir = install_dir.join("libraries");
        let assets_dir = install_dir.join("assets");

        let (version, root_id) = VersionJson::load_merged(&versions_dir, version_id)?;
        let main_class = version
            .main_class
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                LauncherError::Install(format!("Version {} has no mainClass", version_id))
            })?;

        // Classpath
        let jar_id = version.client_jar_id(&root_id);
        let client_jar = versions_dir.join(&jar_id).join(format!("{}.jar", jar_id));
        let mut entries: Vec<String> = version
            .classpath_libraries(&libs_dir)
            .iter()
            .map(|p| safe_path_str(p))
            .collect();
        entries.push(safe_path_str(&client_jar));
        dedup_preserving_order(&mut entries);
        let classpath = entries.join(classpath_separator());
        debug!("Classpath has {} entries", entries.len());

        // Natives
        let natives_dir = versions_dir.join(version_id).join("natives");
        extract_natives(&version.native_jars(&libs_dir), &natives_dir).await?;

        // Java
        let java_bin = java::resolve_java_binary(self.settings.java_path.as_deref());
        let required = version.required_java_major();
        if let Some(major) = java::probe_major_version(&java_bin).await {
            if major < required {
                warn!(
                    "{} wants Java {} but {:?} is Java {}",
                    version_id, required, java_bin, major
                );
            }
        }

        let values = placeholder_values(&PlaceholderInputs {
            version: &version,
            version_id,
            install_dir,
            libs_dir: &libs_dir,
            assets_dir: &assets_dir,
            natives_dir: &natives_dir,
            classpath: &classpath,
            options,
        });

        let raw_jvm = if version.has_modern_jvm_args() {
            version.simple_jvm_args()
        } else {
            vec!["-Djava.library.path=${natives_directory}".to_string()]
        };

        let mut args = self.settings.jvm_memory_args();
        args.extend(sanitize_jvm_args(&raw_jvm, &values));
        args.push("-cp".into());
        args.push(classpath);
        args.push(main_class);
        args.extend(substitute_args(&version.simple_game_args(), &values));

        info!("Launch command for {} built ({} args)", version_id, args.len());
        Ok(LaunchCommand {
            program: java_bin,
            args,
            working_dir: install_dir.to_path_buf(),
            hide_console: true,
        })
    }
}

struct PlaceholderInputs<'a> {
    version: &'a VersionJson,
    version_id: &'a str,
    install_dir: &'a Path,
    libs_dir: &'a Path,
    assets_dir: &'a Path,
    natives_dir: &'a Path,
    classpath: &'a str,
    options: &'a LaunchOptions,
}

fn placeholder_values(input: &PlaceholderInputs<'_>) -> HashMap<&'static str, String> {
    let token = if input.options.auth_token.is_empty() {
        "0".to_string()
    } else {
        input.options.auth_token.clone()
    };
    let user_type = if input.options.licensed { "msa" } else { "legacy" };
    let assets_root = safe_path_str(input.assets_dir);

    HashMap::from([
        ("auth_player_name", input.options.username.clone()),
        ("auth_uuid", input.options.client_id.clone()),
        ("auth_access_token", token.clone()),
        ("auth_session", token),
        ("user_type", user_type.to_string()),
        ("user_properties", "{}".to_string()),
        ("version_name", input.version_id.to_string()),
        (
            "version_type",
            input
                .version
                .version_type
                .clone()
                .unwrap_or_else(|| "release".to_string()),
        ),
        ("game_directory", safe_path_str(input.install_dir)),
        ("assets_root", assets_root.clone()),
        ("game_assets", assets_root),
        ("assets_index_name", input.version.asset_index_id()),
        ("natives_directory", safe_path_str(input.natives_dir)),
        ("library_directory", safe_path_str(input.libs_dir)),
        ("classpath", input.classpath.to_string()),
        ("classpath_separator", classpath_separator().to_string()),
        ("launcher_name", LAUNCHER_NAME.to_string()),
        ("launcher_version", env!("CARGO_PKG_VERSION").to_string()),
    ])
}

/// JVM arguments with any classpath switch (and its value) removed; the
/// builder adds its own `-cp`.
fn sanitize_jvm_args(raw_args: &[String], values: &HashMap<&'static str, String>) -> Vec<String> {
    let mut kept = Vec::with_capacity(raw_args.len());
    let mut i = 0;
    while i < raw_args.len() {
        let arg = &raw_args[i];
        if arg == "-cp" || arg == "-classpath" || arg == "--class-path" {
            i += 2;
            continue;
        }
        kept.push(arg.clone());
        i += 1;
    }
    substitute_args(&kept, values)
}

/// Replace `${name}` placeholders. Arguments left with an unknown placeholder
/// are dropped along with the option flag right before them.
fn substitute_args(raw_args: &[String], values: &HashMap<&'static str, String>) -> Vec<String> {
    let mut resolved_args = Vec::with_capacity(raw_args.len());
    for arg in raw_args {
        let mut resolved = arg.clone();
        for (key, value) in values {
            let token = format!("${{{}}}", key);
            if resolved.contains(&token) {
                resolved = resolved.replace(&token, value);
            }
        }

        if resolved.contains("${") {
            debug!("Dropping unresolved argument {}", arg);
            drop_dangling_option(&mut resolved_args);
            continue;
        }
        resolved_args.push(resolved);
    }
    resolved_args
}

fn drop_dangling_option(args: &mut Vec<String>) {
    if args.last().is_some_and(|last| last.starts_with('-')) {
        let _ = args.pop();
    }
}

fn dedup_preserving_order(entries: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    entries.retain(|entry| {
        let key = if cfg!(target_os = "windows") {
            entry.to_lowercase()
        } else {
            entry.clone()
        };
        seen.insert(key)
    });
}

pub fn classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Path text for java arguments. Java rejects Windows extended-length paths
/// on the classpath, so the `\\?\` prefix is stripped.
fn safe_path_str(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();
    match text.strip_prefix(r"\\?\") {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Unpack top-level `.dll`/`.so`/`.dylib`/`.jnilib` entries of the native
/// jars into a fresh `natives_dir`.
async fn extract_natives(native_jars: &[PathBuf], natives_dir: &Path) -> LauncherResult<()> {
    if natives_dir.exists() {
        let _ = tokio::fs::remove_dir_all(natives_dir).await;
    }
    tokio::fs::create_dir_all(natives_dir)
        .await
        .map_err(|e| LauncherError::Io {
            path: natives_dir.to_path_buf(),
            source: e,
        })?;

    for jar_path in native_jars {
        if !jar_path.is_file() {
            warn!("Native jar missing: {:?}", jar_path);
            continue;
        }
        let jar_bytes = tokio::fs::read(jar_path)
            .await
            .map_err(|e| LauncherError::Io {
                path: jar_path.clone(),
                source: e,
            })?;

        let dest_dir = natives_dir.to_path_buf();
        let path_debug = jar_path.clone();
        tokio::task::spawn_blocking(move || unpack_native_entries(&jar_bytes, &dest_dir, &path_debug))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))??;
    }

    Ok(())
}

fn unpack_native_entries(jar_bytes: &[u8], dest_dir: &Path, jar_path: &Path) -> LauncherResult<()> {
    let cursor = std::io::Cursor::new(jar_bytes);
    let mut archive = match zip::ZipArchive::new(cursor) {
        Ok(a) => a,
        Err(e) => {
            warn!("Cannot open native JAR {:?}: {}", jar_path, e);
            return Ok(());
        }
    };

    for i in 0..archive.len() {
        let Ok(mut file) = archive.by_index(i) else {
            continue;
        };
        let name = file.name().to_string();
        if name.contains("META-INF") || name.contains('/') || name.contains('\\') {
            continue;
        }

        let is_native = name.ends_with(".dll")
            || name.ends_with(".so")
            || name.ends_with(".dylib")
            || name.ends_with(".jnilib");
        if !is_native {
            continue;
        }

        let dest = dest_dir.join(&name);
        let mut out = std::fs::File::create(&dest).map_err(|e| LauncherError::Io {
            path: dest.clone(),
            source: e,
        })?;
        std::io::copy(&mut file, &mut out)?;
        debug!("Extracted native: {}", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::IdentityRecord;
    use crate::core::test_support::zip_bytes;
    use crate::core::version::version_file::current_os_name;

    fn write(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn settings() -> LauncherSettings {
        LauncherSettings {
            memory_mb: 1024,
            java_path: Some(PathBuf::from("/opt/test-jdk/bin/java")),
            ..LauncherSettings::default()
        }
    }

    /// 1.20.1 with a native library, plus a loader profile inheriting it.
    fn seed_install(root: &Path) {
        let versions = root.join("versions");
        let base = serde_json::json!({
            "id": "1.20.1",
            "type": "release",
            "mainClass": "net.minecraft.client.main.Main",
            "assetIndex": {"id": "5", "url": "http://unused/5.json"},
            "libraries": [
                {"name": "com.mojang:brigadier:1.1.8",
                 "downloads": {"artifact": {"path": "com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar", "url": "http://unused"}}},
                {"name": "org.lwjgl:lwjgl-platform:2.9.4",
                 "natives": {(current_os_name()): "natives-test"},
                 "downloads": {"classifiers": {"natives-test": {
                     "path": "org/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-test.jar",
                     "url": "http://unused"
                 }}}}
            ],
            "arguments": {
                "game": [
                    "--username", "${auth_player_name}",
                    "--accessToken", "${auth_access_token}",
                    "--userType", "${user_type}",
                    "--xuid", "${auth_xuid}",
                    "--assetIndex", "${assets_index_name}",
                    {"rules": [{"action": "allow", "features": {"is_demo_user": true}}], "value": "--demo"}
                ],
                "jvm": [
                    "-Djava.library.path=${natives_directory}",
                    "-cp", "${classpath}"
                ]
            }
        });
        let loader = serde_json::json!({
            "id": "fabric-loader-0.15.0-1.20.1",
            "inheritsFrom": "1.20.1",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "libraries": [
                {"name": "net.fabricmc:fabric-loader:0.15.0"},
                {"name": "com.mojang:brigadier:1.1.8",
                 "downloads": {"artifact": {"path": "com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar", "url": "http://unused"}}}
            ],
            "arguments": {"jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "]}
        });
        write(&VersionJson::path_in(&versions, "1.20.1"), base.to_string().as_bytes());
        write(
            &VersionJson::path_in(&versions, "fabric-loader-0.15.0-1.20.1"),
            loader.to_string().as_bytes(),
        );
        write(
            &root.join("libraries/org/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-test.jar"),
            &zip_bytes(&[
                ("liblwjgl.so", b"elf"),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0"),
                ("org/lwjgl/Sys.class", b"cafebabe"),
            ]),
        );
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).map(String::as_str)
    }

    #[tokio::test]
    async fn offline_loader_command_has_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        seed_install(dir.path());
        let options = LaunchOptions::offline("Steve");

        let command = JavaCommandBuilder::new(settings())
            .build("fabric-loader-0.15.0-1.20.1", dir.path(), &options)
            .await
            .unwrap();
        let args = &command.args;

        assert_eq!(command.program, PathBuf::from("/opt/test-jdk/bin/java"));
        assert_eq!(command.working_dir, dir.path());
        assert!(command.hide_console);
        assert_eq!(&args[..2], ["-Xmx1G", "-Xms1G"]);

        let natives = dir.path().join("versions/fabric-loader-0.15.0-1.20.1/natives");
        assert!(args.contains(&format!("-Djava.library.path={}", natives.display())));
        assert!(args.contains(&"-DFabricMcEmu= net.minecraft.client.main.Main ".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "-cp").count(), 1);

        let cp_pos = args.iter().position(|a| a == "-cp").unwrap();
        assert_eq!(args[cp_pos + 2], "net.fabricmc.loader.impl.launch.knot.KnotClient");
        let classpath: Vec<&str> = args[cp_pos + 1].split(classpath_separator()).collect();
        let libs = dir.path().join("libraries");
        assert_eq!(
            classpath,
            vec![
                libs.join("net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar")
                    .to_string_lossy(),
                libs.join("com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar")
                    .to_string_lossy(),
                dir.path().join("versions/1.20.1/1.20.1.jar").to_string_lossy(),
            ]
        );

        assert_eq!(arg_after(args, "--username"), Some("Steve"));
        assert_eq!(arg_after(args, "--accessToken"), Some("0"));
        assert_eq!(arg_after(args, "--userType"), Some("legacy"));
        assert_eq!(arg_after(args, "--assetIndex"), Some("5"));
        assert!(!args.iter().any(|a| a == "--xuid" || a == "--demo"));
        assert!(!args.iter().any(|a| a.contains("${")));

        assert!(natives.join("liblwjgl.so").is_file());
        assert!(!natives.join("MANIFEST.MF").exists());
        assert!(!natives.join("org").exists());
    }

    #[tokio::test]
    async fn licensed_identity_fills_token_and_user_type() {
        let dir = tempfile::tempdir().unwrap();
        seed_install(dir.path());
        let record = IdentityRecord {
            access_token: "mc-token".into(),
            account_id: "0123abcd".into(),
            display_name: "Notch".into(),
        };

        let command = JavaCommandBuilder::new(settings())
            .build("1.20.1", dir.path(), &LaunchOptions::licensed(&record))
            .await
            .unwrap();

        assert_eq!(arg_after(&command.args, "--username"), Some("Notch"));
        assert_eq!(arg_after(&command.args, "--accessToken"), Some("mc-token"));
        assert_eq!(arg_after(&command.args, "--userType"), Some("msa"));
        assert!(command.args.contains(&"net.minecraft.client.main.Main".to_string()));
    }

    #[tokio::test]
    async fn legacy_versions_get_default_library_path() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &VersionJson::path_in(&dir.path().join("versions"), "1.7.10"),
            serde_json::json!({
                "id": "1.7.10",
                "mainClass": "net.minecraft.client.main.Main",
                "assets": "1.7.10",
                "minecraftArguments": "--username ${auth_player_name} --session ${auth_session} --assetsDir ${game_assets}"
            })
            .to_string()
            .as_bytes(),
        );

        let command = JavaCommandBuilder::new(settings())
            .build("1.7.10", dir.path(), &LaunchOptions::offline("Alex"))
            .await
            .unwrap();

        let natives = dir.path().join("versions/1.7.10/natives");
        let assets = dir.path().join("assets").to_string_lossy().into_owned();
        assert!(command
            .args
            .contains(&format!("-Djava.library.path={}", natives.display())));
        assert_eq!(arg_after(&command.args, "--session"), Some("0"));
        assert_eq!(arg_after(&command.args, "--assetsDir"), Some(assets.as_str()));
    }

    #[tokio::test]
    async fn missing_version_json_is_an_install_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JavaCommandBuilder::new(settings())
            .build("1.20.1", dir.path(), &LaunchOptions::offline("Alex"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Install);
    }

    #[test]
    fn unresolved_placeholder_drops_its_option() {
        let values = HashMap::from([("mc_version", "1.20.1".to_string())]);
        let args: Vec<String> = ["--fml.forgeVersion", "${missing}", "--fml.mcVersion", "${mc_version}"]
            .into_iter()
            .map(String::from)
            .collect();

        assert_eq!(substitute_args(&args, &values), vec!["--fml.mcVersion", "1.20.1"]);
    }

    #[test]
    fn classpath_switches_are_removed_from_jvm_args() {
        let args: Vec<String> = ["-XX:+UseG1GC", "-cp", "${classpath}", "--class-path", "/tmp/wrong.jar"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(sanitize_jvm_args(&args, &HashMap::new()), vec!["-XX:+UseG1GC"]);
    }
}

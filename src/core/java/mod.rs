// ─── Java ───
// Picks the java binary for launches and Forge processors.

use std::path::{Path, PathBuf};

use tracing::debug;

pub fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Java to run: the configured path, then `$JAVA_HOME/bin/java`, then the
/// first `java` on `PATH`. Falls back to the bare name and lets the spawn fail.
pub fn resolve_java_binary(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured.filter(|p| !p.as_os_str().is_empty()) {
        debug!("Using configured java {:?}", path);
        return path.to_path_buf();
    }

    let java_home = std::env::var_os("JAVA_HOME").map(PathBuf::from);
    let path_var = std::env::var_os("PATH");
    resolve_from_env(java_home.as_deref(), path_var.as_deref())
}

fn resolve_from_env(java_home: Option<&Path>, path_var: Option<&std::ffi::OsStr>) -> PathBuf {
    if let Some(home) = java_home {
        let candidate = home.join("bin").join(java_exe());
        if candidate.is_file() {
            debug!("Using JAVA_HOME java {:?}", candidate);
            return candidate;
        }
    }

    if let Some(path_var) = path_var {
        for dir in std::env::split_paths(path_var) {
            let candidate = dir.join(java_exe());
            if candidate.is_file() {
                debug!("Using java from PATH {:?}", candidate);
                return candidate;
            }
        }
    }

    PathBuf::from(java_exe())
}

/// Major version reported by `java -version`, `None` when it cannot run.
pub async fn probe_major_version(java: &Path) -> Option<u32> {
    let output = tokio::process::Command::new(java)
        .arg("-version")
        .output()
        .await
        .ok()?;
    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    parse_version_string(&text).map(|v| parse_major_version(&v))
}

fn parse_version_string(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

/// `1.8.0_392` → 8, `17.0.9` → 17.
fn parse_major_version(version: &str) -> u32 {
    let mut parts = version.split(['.', '_', '-', '+']);
    match parts.next().and_then(|p| p.parse::<u32>().ok()) {
        Some(1) => parts.next().and_then(|p| p.parse().ok()).unwrap_or(0),
        Some(major) => major,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins() {
        let path = Path::new("/opt/jdk/bin/java");
        assert_eq!(resolve_java_binary(Some(path)), path);
    }

    #[test]
    fn java_home_then_path_then_bare_name() {
        let home = tempfile::tempdir().unwrap();
        let on_path = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join("bin")).unwrap();
        std::fs::write(home.path().join("bin").join(java_exe()), b"").unwrap();
        std::fs::write(on_path.path().join(java_exe()), b"").unwrap();
        let path_var = std::env::join_paths([on_path.path()]).unwrap();

        assert_eq!(
            resolve_from_env(Some(home.path()), Some(&path_var)),
            home.path().join("bin").join(java_exe())
        );
        assert_eq!(
            resolve_from_env(Some(Path::new("/missing")), Some(&path_var)),
            on_path.path().join(java_exe())
        );
        assert_eq!(resolve_from_env(None, None), PathBuf::from(java_exe()));
    }

    #[test]
    fn major_versions_parse_both_schemes() {
        let legacy = "java version \"1.8.0_392\"\nJava(TM) SE Runtime Environment";
        let modern = "openjdk version \"17.0.9\" 2023-10-17\nOpenJDK Runtime Environment";
        assert_eq!(parse_version_string(legacy).map(|v| parse_major_version(&v)), Some(8));
        assert_eq!(parse_version_string(modern).map(|v| parse_major_version(&v)), Some(17));
        assert_eq!(parse_version_string("no quotes here"), None);
    }
}

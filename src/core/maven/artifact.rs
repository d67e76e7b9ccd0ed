use std::fmt;
use std::path::PathBuf;

use crate::core::error::{LauncherError, LauncherResult};

/// A parsed Maven coordinate as found in version and loader profiles.
///
/// Accepted forms:
///   `group:artifact:version`
///   `group:artifact:version:classifier`
/// each optionally followed by `@extension`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension, `"jar"` unless overridden with `@`.
    pub extension: String,
}

impl MavenArtifact {
    pub fn parse(coord: &str) -> LauncherResult<Self> {
        let (coord_part, extension) = match coord.rsplit_once('@') {
            Some((head, ext)) if !ext.is_empty() => (head, ext),
            Some(_) => return Err(LauncherError::InvalidMavenCoordinate(coord.to_string())),
            None => (coord, "jar"),
        };

        let parts: Vec<&str> = coord_part.split(':').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(LauncherError::InvalidMavenCoordinate(coord.to_string()));
        }

        let classifier = match parts.len() {
            3 => None,
            4 => Some(parts[3].to_string()),
            _ => return Err(LauncherError::InvalidMavenCoordinate(coord.to_string())),
        };

        Ok(Self {
            group_id: parts[0].to_string(),
            artifact_id: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier,
            extension: extension.to_string(),
        })
    }

    /// `artifactId-version[-classifier].extension`
    pub fn filename(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, c, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension),
        }
    }

    /// Repository-relative path with forward slashes, as used in URLs.
    pub fn repo_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            self.filename()
        )
    }

    /// Full URL under the given repository base.
    pub fn url(&self, repo_base: &str) -> String {
        format!("{}/{}", repo_base.trim_end_matches('/'), self.repo_path())
    }

    /// Path relative to the `libraries/` directory.
    pub fn local_path(&self) -> PathBuf {
        self.repo_path().split('/').collect()
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_coordinate() {
        let a = MavenArtifact::parse("net.sf.jopt-simple:jopt-simple:5.0.4").unwrap();
        assert_eq!(a.group_id, "net.sf.jopt-simple");
        assert_eq!(a.artifact_id, "jopt-simple");
        assert_eq!(a.version, "5.0.4");
        assert_eq!(a.classifier, None);
        assert_eq!(a.extension, "jar");
    }

    #[test]
    fn parse_classifier_and_extension() {
        let a = MavenArtifact::parse("net.minecraft:client:1.20.1-20230612.114412:mappings@txt")
            .unwrap();
        assert_eq!(a.classifier.as_deref(), Some("mappings"));
        assert_eq!(a.extension, "txt");
        assert_eq!(a.filename(), "client-1.20.1-20230612.114412-mappings.txt");
        assert_eq!(
            a.to_string(),
            "net.minecraft:client:1.20.1-20230612.114412:mappings@txt"
        );
    }

    #[test]
    fn rejects_malformed_coordinates() {
        for bad in ["just-a-name", "a:b", "a::1.0", "a:b:c:d:e", "a:b:1.0@"] {
            assert!(MavenArtifact::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn url_and_local_path_follow_repository_layout() {
        let a = MavenArtifact::parse("org.lwjgl:lwjgl:3.3.1:natives-linux").unwrap();
        assert_eq!(
            a.url("https://libraries.minecraft.net/"),
            "https://libraries.minecraft.net/org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar"
        );
        assert_eq!(
            a.local_path(),
            PathBuf::from("org")
                .join("lwjgl")
                .join("lwjgl")
                .join("3.3.1")
                .join("lwjgl-3.3.1-natives-linux.jar")
        );
    }
}

use quick_xml::de::from_str;
use serde::Deserialize;

use crate::core::error::LauncherResult;

/// `maven-metadata.xml` of a single artifact; only the version list is used.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MavenMetadata {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub versioning: Option<MavenVersioning>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MavenVersioning {
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub versions: Option<MavenVersions>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MavenVersions {
    #[serde(default, rename = "version")]
    pub items: Vec<String>,
}

impl MavenMetadata {
    pub fn parse(xml: &str) -> LauncherResult<Self> {
        Ok(from_str(xml)?)
    }

    /// Versions in document order.
    pub fn versions(&self) -> &[String] {
        self.versioning
            .as_ref()
            .and_then(|v| v.versions.as_ref())
            .map(|v| v.items.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_list_in_document_order() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>net.minecraftforge</groupId>
  <artifactId>forge</artifactId>
  <versioning>
    <latest>1.20.1-47.2.0</latest>
    <release>1.20.1-47.2.0</release>
    <versions>
      <version>1.20.1-47.2.0</version>
      <version>1.20.1-47.1.0</version>
      <version>1.19.4-45.1.0</version>
    </versions>
  </versioning>
</metadata>"#;

        let meta = MavenMetadata::parse(xml).unwrap();
        assert_eq!(meta.artifact_id.as_deref(), Some("forge"));
        assert_eq!(
            meta.versions(),
            ["1.20.1-47.2.0", "1.20.1-47.1.0", "1.19.4-45.1.0"]
        );
    }

    #[test]
    fn metadata_without_versions_is_empty() {
        let meta = MavenMetadata::parse("<metadata><groupId>g</groupId></metadata>").unwrap();
        assert!(meta.versions().is_empty());
    }
}

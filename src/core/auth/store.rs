use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::IdentityRecord;
use crate::core::error::{LauncherError, LauncherResult};

pub const IDENTITY_FILE: &str = "auth_data.json";

/// `auth_data.json` in the launcher data directory.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(IDENTITY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// The saved record, `None` when absent or unreadable.
    pub fn load(&self) -> Option<IdentityRecord> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring malformed identity file {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub fn save(&self, record: &IdentityRecord) -> LauncherResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, json).map_err(|e| LauncherError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        info!("Saved identity for {}", record.display_name);
        Ok(())
    }

    /// Remove the record. Deleting a missing record is not an error.
    pub fn delete(&self) -> LauncherResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LauncherError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> IdentityRecord {
        IdentityRecord {
            access_token: format!("token-{name}"),
            account_id: format!("id-{name}"),
            display_name: name.into(),
        }
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());

        store.save(&record("Steve")).unwrap();
        store.save(&record("Alex")).unwrap();

        assert_eq!(store.load(), Some(record("Alex")));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path());
        store.save(&record("Steve")).unwrap();

        store.delete().unwrap();
        store.delete().unwrap();
        assert!(!store.exists());
        assert_eq!(store.load(), None);
    }

    #[test]
    fn malformed_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), "[1, 2").unwrap();
        assert_eq!(IdentityStore::new(dir.path()).load(), None);
    }
}

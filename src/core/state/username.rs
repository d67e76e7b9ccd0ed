use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

pub const SAVED_USERNAME_KEY: &str = "saved_username";

/// Small string store the front-end uses to remember values between runs.
pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, value: &str) -> LauncherResult<()>;
}

/// Stores each key as `<dir>/<key>.txt`, single line, last writer wins.
pub struct TextFileStore {
    dir: PathBuf,
}

impl TextFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", key))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl KeyValueStore for TextFileStore {
    fn load(&self, key: &str) -> Option<String> {
        let raw = std::fs::read_to_string(self.path_for(key)).ok()?;
        let value = raw.lines().next().unwrap_or_default().trim().to_string();
        (!value.is_empty()).then_some(value)
    }

    fn save(&self, key: &str, value: &str) -> LauncherResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| LauncherError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.path_for(key);
        let line = value.lines().next().unwrap_or_default().trim();
        std::fs::write(&path, line).map_err(|e| LauncherError::Io { path, source: e })?;
        debug!("Saved {}", key);
        Ok(())
    }
}

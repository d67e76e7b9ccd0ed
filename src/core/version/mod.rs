pub mod installer;
pub mod manifest;
pub mod version_file;

pub use installer::{MinecraftInstaller, VersionInstaller};
pub use manifest::{VersionCategory, VersionEntry, VersionManifest};
pub use version_file::{AssetIndexInfo, LibraryEntry, VersionJson};

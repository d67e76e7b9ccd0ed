pub mod context;
pub mod fabric;
pub mod forge;
pub mod installer;
pub mod quilt;

pub use context::InstallContext;
pub use installer::{Installer, LoaderInstallResult, LoaderInstaller, LoaderKind};

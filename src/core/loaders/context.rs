use std::path::Path;

use crate::core::downloader::Downloader;
use crate::core::progress::ProgressSink;

/// Everything a loader installer needs to layer itself over an installed
/// base version.
pub struct InstallContext<'a> {
    pub minecraft_version: &'a str,
    pub install_dir: &'a Path,
    pub versions_dir: &'a Path,
    pub libs_dir: &'a Path,
    pub downloader: &'a Downloader,
    /// Java used for installer-side processors.
    pub java_path: &'a Path,
    pub progress: &'a dyn ProgressSink,
}

// ─── Archive Installer ───
// Zip extraction for downloaded release packages and executable lookup in the
// extracted tree.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::core::error::{LauncherError, LauncherResult};

fn corrupt(path: &Path, e: impl std::fmt::Display) -> LauncherError {
    LauncherError::CorruptArchive {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Extract `archive_path` into `dest_dir`, creating it if needed.
///
/// Progress is reported as `(done_entries, total_entries)`. Entries whose names
/// would escape `dest_dir` are skipped.
pub fn extract_zip<F>(archive_path: &Path, dest_dir: &Path, mut on_progress: F) -> LauncherResult<u64>
where
    F: FnMut(u64, u64),
{
    let file = File::open(archive_path).map_err(|e| LauncherError::Io {
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupt(archive_path, e))?;

    std::fs::create_dir_all(dest_dir).map_err(|e| LauncherError::Io {
        path: dest_dir.to_path_buf(),
        source: e,
    })?;

    let total = archive.len() as u64;
    let mut done: u64 = 0;
    on_progress(0, total);

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(archive_path, e))?;

        let Some(safe_rel) = entry.enclosed_name() else {
            warn!("Skipped unsafe archive path: {}", entry.name());
            done += 1;
            on_progress(done, total);
            continue;
        };
        let out_path = dest_dir.join(safe_rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| LauncherError::Io {
                path: out_path.clone(),
                source: e,
            })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            let mut out_file = File::create(&out_path).map_err(|e| LauncherError::Io {
                path: out_path.clone(),
                source: e,
            })?;
            // a failing read here means the compressed stream is damaged
            std::io::copy(&mut entry, &mut out_file).map_err(|e| corrupt(archive_path, e))?;
        }

        done += 1;
        on_progress(done, total);
    }

    debug!("Extracted {} entries from {:?}", total, archive_path);
    Ok(total)
}

/// [`extract_zip`] on the blocking pool, forwarding its `(done, total)`
/// progress to `on_progress` on the calling task.
pub async fn extract(
    archive_path: &Path,
    dest_dir: &Path,
    on_progress: &mut (dyn FnMut(u64, u64) + Send),
) -> LauncherResult<u64> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let task = tokio::task::spawn_blocking(move || {
        extract_zip(&archive_path, &dest_dir, |done, total| {
            let _ = tx.send((done, total));
        })
    });

    while let Some((done, total)) = rx.recv().await {
        on_progress(done, total);
    }
    task.await
        .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))?
}

/// First file named exactly `exe_name` below `root_dir`.
///
/// Depth-first, siblings visited in lexicographic order, so the answer is
/// stable for a given tree.
pub fn find_executable(root_dir: &Path, exe_name: &str) -> Option<PathBuf> {
    WalkDir::new(root_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .find(|entry| entry.file_type().is_file() && entry.file_name() == exe_name)
        .map(|entry| entry.into_path())
}

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// Bytes written per `write_all` call while streaming a response body.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// A single file to download with optional SHA-1 for validation.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

/// Counters for everything fetched through one [`Downloader`].
#[derive(Debug, Default)]
pub struct DownloadStats {
    files: AtomicU64,
    bytes: AtomicU64,
}

impl DownloadStats {
    pub fn files(&self) -> u64 {
        self.files.load(Ordering::SeqCst)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    fn record(&self, bytes: u64) {
        self.files.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }
}

/// Result of streaming a body to disk.
#[derive(Debug)]
pub struct StreamedFile {
    pub bytes: u64,
    pub sha1: String,
}

/// Concurrent, SHA-1 validated downloader.
///
/// Bodies are streamed into a staging directory and only moved to their final
/// location once complete and verified, so an interrupted transfer never leaves
/// a truncated file inside the install tree.
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    staging_dir: PathBuf,
    stats: DownloadStats,
}

impl Downloader {
    pub fn new(client: Client, staging_dir: PathBuf) -> Self {
        Self {
            client,
            concurrency: 8,
            staging_dir,
            stats: DownloadStats::default(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    // ── Single file download ────────────────────────────

    /// Download a single file to `dest`, optionally validating SHA-1.
    ///
    /// Creates parent directories only after the body has been fully received.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> LauncherResult<()> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| LauncherError::Io {
                path: self.staging_dir.clone(),
                source: e,
            })?;

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".into());
        let staging = self
            .staging_dir
            .join(format!("{}-{}.part", uuid::Uuid::new_v4(), file_name));

        let streamed = match stream_to_file(response, &staging, url, &mut |_, _| {}).await {
            Ok(streamed) => streamed,
            Err(e) => {
                discard_partial(&staging).await;
                return Err(e);
            }
        };

        if let Some(expected) = sha1_expected {
            if !streamed.sha1.eq_ignore_ascii_case(expected) {
                discard_partial(&staging).await;
                return Err(LauncherError::Sha1Mismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual: streamed.sha1,
                });
            }
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        if let Err(e) = move_into_place(&staging, dest).await {
            discard_partial(&staging).await;
            return Err(e);
        }

        self.stats.record(streamed.bytes);
        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(())
    }

    /// Make sure `dest` exists and matches `sha1_expected`, downloading it otherwise.
    ///
    /// Returns `true` when a download happened.
    pub async fn ensure_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> LauncherResult<bool> {
        if dest.is_file() {
            match sha1_expected {
                None => return Ok(false),
                Some(expected) => {
                    if Self::validate_sha1(dest, expected).await? {
                        return Ok(false);
                    }
                    warn!("Checksum mismatch for {:?}, downloading again", dest);
                }
            }
        }

        self.download_file(url, dest, sha1_expected).await?;
        Ok(true)
    }

    /// [`Downloader::ensure_file`] for a batch entry. A present file whose
    /// length differs from the declared size is fetched again without hashing it.
    async fn ensure_entry(&self, entry: &DownloadEntry) -> LauncherResult<bool> {
        if let Some(size) = entry.size {
            let len = tokio::fs::metadata(&entry.dest).await.map(|m| m.len()).ok();
            if matches!(len, Some(len) if len != size) {
                warn!(
                    "Size mismatch for {:?} ({:?} != {}), downloading again",
                    entry.dest, len, size
                );
                self.download_file(&entry.url, &entry.dest, entry.sha1.as_deref())
                    .await?;
                return Ok(true);
            }
        }
        self.ensure_file(&entry.url, &entry.dest, entry.sha1.as_deref())
            .await
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Ensure many files concurrently using `buffer_unordered`.
    ///
    /// `on_done` runs once per entry, success or not. Returns the list of
    /// files that failed (if any).
    pub async fn download_batch(
        &self,
        entries: Vec<DownloadEntry>,
        on_done: &(dyn Fn() + Send + Sync),
    ) -> Vec<(DownloadEntry, LauncherError)> {
        info!(
            "Starting batch download: {} files, concurrency={}",
            entries.len(),
            self.concurrency
        );

        let results: Vec<_> = stream::iter(entries)
            .map(|entry| async move {
                let result = self.ensure_entry(&entry).await;
                on_done();
                (entry, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(entry, result)| match result {
                Ok(_) => None,
                Err(e) => Some((entry, e)),
            })
            .collect()
    }

    /// [`Downloader::download_batch`] that fails with the first error.
    pub async fn download_all(
        &self,
        entries: Vec<DownloadEntry>,
        on_done: &(dyn Fn() + Send + Sync),
    ) -> LauncherResult<()> {
        let total = entries.len();
        let mut failures = self.download_batch(entries, on_done).await;
        if failures.is_empty() {
            return Ok(());
        }

        warn!("{} of {} downloads failed", failures.len(), total);
        let (entry, err) = failures.swap_remove(0);
        debug!("First failed download: {}", entry.url);
        Err(err)
    }

    /// Validate an existing file's SHA-1.
    pub async fn validate_sha1(path: &Path, expected: &str) -> LauncherResult<bool> {
        let bytes = tokio::fs::read(path).await.map_err(|e| LauncherError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let actual = hex::encode(hasher.finalize());
        Ok(actual.eq_ignore_ascii_case(expected))
    }
}

/// Stream a response body into `path` in [`CHUNK_SIZE`] writes.
///
/// `on_progress(downloaded, total)` is only called when the server sent a
/// content length. The file is left as-is on failure.
pub async fn stream_to_file(
    response: reqwest::Response,
    path: &Path,
    url: &str,
    on_progress: &mut (dyn FnMut(u64, u64) + Send),
) -> LauncherResult<StreamedFile> {
    let total = response.content_length();
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| LauncherError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut hasher = Sha1::new();
    let mut downloaded: u64 = 0;
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| LauncherError::DownloadInterrupted {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        for piece in chunk.chunks(CHUNK_SIZE) {
            file.write_all(piece).await.map_err(|e| LauncherError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            hasher.update(piece);
            downloaded += piece.len() as u64;
            if let Some(total) = total {
                on_progress(downloaded, total);
            }
        }
    }

    file.flush().await.map_err(|e| LauncherError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    // handle must be closed before the file is renamed on Windows
    drop(file);

    if let Some(total) = total {
        if downloaded < total {
            return Err(LauncherError::DownloadInterrupted {
                url: url.to_string(),
                message: format!("received {} of {} bytes", downloaded, total),
            });
        }
    }

    Ok(StreamedFile {
        bytes: downloaded,
        sha1: hex::encode(hasher.finalize()),
    })
}

async fn move_into_place(staging: &Path, dest: &Path) -> LauncherResult<()> {
    if tokio::fs::rename(staging, dest).await.is_ok() {
        return Ok(());
    }

    // staging dir may sit on another filesystem
    tokio::fs::copy(staging, dest)
        .await
        .map_err(|e| LauncherError::Io {
            path: dest.to_path_buf(),
            source: e,
        })?;
    discard_partial(staging).await;
    Ok(())
}

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove partial download {:?}: {}", path, e);
        }
    }
}

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Central error type for the entire launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Download of {url} interrupted: {message}")]
    DownloadInterrupted { url: String, message: String },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── XML ─────────────────────────────────────────────
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Release feed ────────────────────────────────────
    #[error("Release {0} has no downloadable assets")]
    NoAssets(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Corrupt archive {path:?}: {message}")]
    CorruptArchive { path: PathBuf, message: String },

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Install ─────────────────────────────────────────
    #[error("Install failed: {0}")]
    Install(String),

    #[error("No {loader} build available for Minecraft {version}")]
    UnsupportedVersion { loader: String, version: String },

    #[error("Loader API unreachable: {0}")]
    LoaderApi(String),

    // ── Identity ────────────────────────────────────────
    #[error("No saved licensed identity, log in first")]
    NoIdentity,

    #[error("Authentication hop {hop} failed: {message}")]
    AuthExchange { hop: u8, message: String },

    #[error("Login window closed by the user")]
    UserCancelled,

    // ── Launch ──────────────────────────────────────────
    #[error("Could not start {program:?}: {message}")]
    Launch { program: PathBuf, message: String },

    #[error("A launch is already running")]
    AlreadyRunning,

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

/// Coarse classification surfaced to callers when a run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    NoAssets,
    UnsupportedVersion,
    NoIdentity,
    CorruptArchive,
    Install,
    AuthExchange,
    UserCancelled,
    Launch,
    AlreadyRunning,
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Http(_)
            | LauncherError::DownloadFailed { .. }
            | LauncherError::DownloadInterrupted { .. }
            | LauncherError::LoaderApi(_) => ErrorKind::Network,
            LauncherError::NoAssets(_) => ErrorKind::NoAssets,
            LauncherError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            LauncherError::NoIdentity => ErrorKind::NoIdentity,
            LauncherError::CorruptArchive { .. } | LauncherError::Zip(_) => {
                ErrorKind::CorruptArchive
            }
            LauncherError::AuthExchange { .. } => ErrorKind::AuthExchange,
            LauncherError::UserCancelled => ErrorKind::UserCancelled,
            LauncherError::Launch { .. } => ErrorKind::Launch,
            LauncherError::AlreadyRunning => ErrorKind::AlreadyRunning,
            LauncherError::Io { .. }
            | LauncherError::Sha1Mismatch { .. }
            | LauncherError::InvalidMavenCoordinate(_)
            | LauncherError::Xml(_)
            | LauncherError::Json(_)
            | LauncherError::Install(_)
            | LauncherError::Other(_) => ErrorKind::Install,
        }
    }

    /// Wrap a failure from one step of the login exchange.
    pub fn auth_hop(hop: u8, message: impl fmt::Display) -> Self {
        LauncherError::AuthExchange {
            hop,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::NoAssets => "no-assets",
            ErrorKind::UnsupportedVersion => "unsupported-version",
            ErrorKind::NoIdentity => "no-identity",
            ErrorKind::CorruptArchive => "corrupt-archive",
            ErrorKind::Install => "install",
            ErrorKind::AuthExchange => "auth-exchange",
            ErrorKind::UserCancelled => "user-cancelled",
            ErrorKind::Launch => "launch",
            ErrorKind::AlreadyRunning => "already-running",
        };
        f.write_str(name)
    }
}

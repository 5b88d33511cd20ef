//! Error types for gvs.
//!
//! The core modules (catalog, cache, installer, registry, orchestrator) return
//! [`GvsError`] so callers and tests can match on the failure kind. The command
//! layer wraps these in `anyhow` with additional context before they reach
//! `main`.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GvsError>;

#[derive(Debug, Error)]
pub enum GvsError {
    #[error(
        "unsupported platform: {os} on {arch} \
         (supported: linux, darwin on amd64, arm64, 386, armv6l)"
    )]
    UnsupportedPlatform { os: String, arch: String },

    #[error("version catalog unavailable at {url}: {message}")]
    CatalogUnavailable { url: String, message: String },

    #[error("no {platform} versions found in catalog at {url}")]
    NoVersionsFound { url: String, platform: String },

    #[error("version {version} is not available for {platform}; run 'gvs versions' to see what is")]
    VersionNotAvailable { version: String, platform: String },

    #[error("download of {url} failed: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("failed to extract {archive}: {message}")]
    ExtractionFailed { archive: PathBuf, message: String },

    #[error("version {version} is not installed; run 'gvs install {version}' first")]
    VersionNotInstalled { version: String },

    #[error("no active installation found")]
    NotInstalled,

    #[error("version {version} is currently active; remove the active installation instead")]
    VersionActive { version: String },

    #[error("invalid version '{input}'")]
    InvalidVersion { input: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("permission denied writing {path}; re-run with sufficient privileges")]
    PermissionDenied { path: PathBuf },

    #[error("I/O error {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GvsError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Like [`GvsError::io`], but maps permission failures on `path` to
    /// [`GvsError::PermissionDenied`].
    pub fn io_at(
        path: impl Into<PathBuf>,
        context: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path: path.into() }
        } else {
            Self::io(context, source)
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

//! Local archive cache.
//!
//! Archives live in a flat directory under their release file name. A file
//! under its final name is always complete: downloads land in a hidden
//! `.partial` temp file in the same directory and are renamed into place only
//! after checksum verification. Each key is guarded by an advisory lock so
//! concurrent runs fetching the same archive serialize instead of racing.
//!
//! A process killed mid-download cannot clean up after itself. Its partial
//! file is reclaimed by the next fetch or `clear`, which delete any partial
//! whose key lock is free. A held lock marks a live download.

use crate::catalog::CatalogEntry;
use crate::checksums::{ChecksumSource, DigestLookup};
use crate::errors::{GvsError, Result};
use crate::fetch::Fetcher;
use crate::fsutil::{ensure_dir, LockGuard};
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCKS_DIR: &str = ".locks";
const PARTIAL_SUFFIX: &str = ".partial";

/// Archive file name for one (version, platform) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// The name exactly as the catalog listed it.
    pub fn from_entry(entry: &CatalogEntry) -> Result<Self> {
        Self::parse(&entry.archive)
    }

    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.ends_with(PARTIAL_SUFFIX)
        {
            return Err(GvsError::config(format!("invalid archive name {name:?}")));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Downloaded now and matched the published digest.
    Verified { sha256: String },
    /// Downloaded now; no published digest could be obtained.
    Unverified { reason: String },
    /// Served from the cache without touching the network.
    CacheHit,
}

#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub key: CacheKey,
    pub path: PathBuf,
    pub verification: Verification,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

pub struct ArtifactCache<'a> {
    dir: PathBuf,
    fetcher: &'a dyn Fetcher,
    download_url: String,
    checksums: Option<&'a dyn ChecksumSource>,
}

impl<'a> ArtifactCache<'a> {
    pub fn new(
        dir: impl Into<PathBuf>,
        fetcher: &'a dyn Fetcher,
        download_url: &str,
        checksums: Option<&'a dyn ChecksumSource>,
    ) -> Self {
        let mut download_url = download_url.to_string();
        if !download_url.ends_with('/') {
            download_url.push('/');
        }
        Self {
            dir: dir.into(),
            fetcher,
            download_url,
            checksums,
        }
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    pub fn fetch(&self, key: &CacheKey) -> Result<CachedArtifact> {
        ensure_dir(&self.dir)?;
        let _lock = LockGuard::acquire(&self.lock_path(key.as_str()))?;
        self.sweep_partials(key);

        let final_path = self.path_for(key);
        if final_path.is_file() {
            debug!(%key, "cache hit");
            return Ok(CachedArtifact {
                key: key.clone(),
                path: final_path,
                verification: Verification::CacheHit,
            });
        }

        let url = format!("{}{}", self.download_url, key);
        // Dropping `tmp` on any early return deletes the partial file.
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{key}."))
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&self.dir)
            .map_err(|e| {
                let context = format!("creating temp file in {}", self.dir.display());
                GvsError::io_at(&self.dir, context, e)
            })?;

        info!(%url, "downloading");
        let bytes = self
            .fetcher
            .download(&url, tmp.as_file_mut())
            .map_err(|e| GvsError::DownloadFailed {
                url: url.clone(),
                message: e.message,
            })?;
        debug!(%key, bytes, "download complete");

        let verification = match self.checksums.map(|c| c.lookup(key.as_str())) {
            Some(DigestLookup::Found(expected)) => {
                let actual = sha256_file(tmp.path())?;
                if !actual.eq_ignore_ascii_case(&expected) {
                    let _ = tmp.close();
                    return Err(GvsError::ChecksumMismatch {
                        key: key.to_string(),
                        expected,
                        actual,
                    });
                }
                Verification::Verified { sha256: actual }
            }
            Some(DigestLookup::Missing) => Verification::Unverified {
                reason: format!("no published checksum for {key}"),
            },
            Some(DigestLookup::Unavailable(reason)) => Verification::Unverified { reason },
            None => Verification::Unverified {
                reason: "checksum source disabled".to_string(),
            },
        };
        if let Verification::Unverified { reason } = &verification {
            warn!(%key, %reason, "archive not verified against a published checksum");
        }

        tmp.persist(&final_path).map_err(|e| {
            let context = format!("moving archive into {}", final_path.display());
            GvsError::io_at(&final_path, context, e.error)
        })?;
        Ok(CachedArtifact {
            key: key.clone(),
            path: final_path,
            verification,
        })
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(LOCKS_DIR).join(format!("{name}.lock"))
    }

    /// Remove leftovers of interrupted downloads. Partials of `held` are ours
    /// to delete since the caller holds that key's lock; any other key's
    /// partial goes only if its lock can be taken right now.
    fn sweep_partials(&self, held: &CacheKey) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(owner) = partial_owner(&name) else {
                continue;
            };
            let _guard = if owner == held.as_str() {
                None
            } else {
                match LockGuard::try_acquire(&self.lock_path(owner)) {
                    Ok(Some(guard)) => Some(guard),
                    _ => {
                        debug!(file = %name, "leaving partial of a download in progress");
                        continue;
                    }
                }
            };
            debug!(file = %name, "removing stale partial download");
            let _ = std::fs::remove_file(entry.path());
        }
    }

    /// Completed archives, sorted by name.
    pub fn list(&self) -> Result<Vec<CacheEntry>> {
        let entries = match fs_err::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GvsError::io(format!("reading {}", self.dir.display()), e)),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GvsError::io("reading cache entry", e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            out.push(CacheEntry {
                name,
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Local>::from),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Delete every archive and partial download whose key is not locked by
    /// a fetch in progress. Lock files stay, since a waiter may already have
    /// one open. Returns the number of archives removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match fs_err::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                let context = format!("reading {}", self.dir.display());
                return Err(GvsError::io_at(&self.dir, context, e));
            }
        };
        let mut removed = 0;
        let mut skipped = 0;
        for entry in entries {
            let entry = entry.map_err(|e| GvsError::io("reading cache entry", e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == LOCKS_DIR {
                continue;
            }
            let path = entry.path();
            let is_dir = path.is_dir();
            let is_archive = !is_dir && !name.starts_with('.');
            let owner = if is_archive {
                Some(name.as_str())
            } else {
                partial_owner(&name)
            };
            let _guard = match owner {
                Some(key) => match LockGuard::try_acquire(&self.lock_path(key))? {
                    Some(guard) => Some(guard),
                    None => {
                        debug!(file = %name, "skipping entry locked by a running fetch");
                        skipped += 1;
                        continue;
                    }
                },
                None => None,
            };
            let res = if is_dir {
                fs_err::remove_dir_all(&path)
            } else {
                fs_err::remove_file(&path)
            };
            res.map_err(|e| GvsError::io_at(&path, format!("removing {}", path.display()), e))?;
            if is_archive {
                removed += 1;
            }
        }
        if skipped > 0 {
            warn!(skipped, "left entries of downloads still in progress");
        }
        info!(dir = %self.dir.display(), removed, "cache cleared");
        Ok(removed)
    }
}

/// Key of a partial download named `.<key>.<random>.partial`.
fn partial_owner(name: &str) -> Option<&str> {
    let stem = name.strip_prefix('.')?.strip_suffix(PARTIAL_SUFFIX)?;
    let (key, _random) = stem.rsplit_once('.')?;
    (!key.is_empty()).then_some(key)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs_err::File::open(path)
        .map_err(|e| GvsError::io(format!("opening {} for checksum", path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| GvsError::io(format!("reading {} for checksum", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

use crate::errors::{GvsError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::debug;

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs_err::create_dir_all(p)
        .map_err(|e| GvsError::io_at(p, format!("creating dir {}", p.display()), e))
}

/// Fail with `PermissionDenied` unless files can be created in `dir`
/// (creating it first if needed).
pub fn check_writable(dir: &Path) -> Result<()> {
    ensure_dir(dir)?;
    tempfile::Builder::new()
        .prefix(".gvs-write-check")
        .tempfile_in(dir)
        .map(drop)
        .map_err(|e| GvsError::io_at(dir, format!("writing to {}", dir.display()), e))
}

/// An exclusive advisory lock, released when dropped.
pub struct LockGuard {
    file: File,
}

impl LockGuard {
    /// Block until the lock at `path` is held. The lock file itself is left in
    /// place; only the OS lock matters.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        if file.try_lock_exclusive().is_err() {
            debug!(lock = %path.display(), "waiting for lock held by another process");
            file.lock_exclusive()
                .map_err(|e| GvsError::io(format!("locking {}", path.display()), e))?;
        }
        Ok(Self { file })
    }

    /// Take the lock only if nobody holds it. `None` means another holder,
    /// possibly in this same process, has it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(GvsError::io(format!("locking {}", path.display()), e)),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| GvsError::io_at(path, format!("opening lock {}", path.display()), e))
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

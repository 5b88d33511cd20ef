//! Installed versions and the active link.
//!
//! Each installed version is a directory `versions/<x.y.z>`. The active
//! version is a symlink at the configured active path pointing at one of them.
//! The link is only ever replaced by renaming a freshly created link over it,
//! so readers see either the old target or the new one and never a missing
//! path. Mutations hold an advisory lock next to the active path.

use crate::config::Paths;
use crate::confirm::{Confirm, Prompt};
use crate::errors::{GvsError, Result};
use crate::fsutil::{ensure_dir, LockGuard};
use crate::platform::platform;
use crate::version::Version;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What currently sits at the active path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveState {
    Absent,
    /// Symlink into the versions root whose target exists.
    Managed(Version),
    /// Symlink into the versions root whose target has been deleted.
    Dangling(Version),
    /// A real directory, a file, or a symlink pointing elsewhere. `version` is
    /// read from the payload's `VERSION` file when there is one.
    Unmanaged {
        path: PathBuf,
        version: Option<Version>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched,
    AlreadyActive,
    Declined,
}

pub struct InstalledVersionRegistry {
    versions: PathBuf,
    active: PathBuf,
    prefix: String,
}

impl InstalledVersionRegistry {
    pub fn new(paths: &Paths, prefix: &str) -> Self {
        Self {
            versions: paths.versions.clone(),
            active: paths.active.clone(),
            prefix: prefix.to_string(),
        }
    }

    pub fn versions_dir(&self) -> &Path {
        &self.versions
    }

    pub fn active_path(&self) -> &Path {
        &self.active
    }

    pub fn version_dir(&self, version: Version) -> PathBuf {
        self.versions.join(version.to_string())
    }

    /// Installed versions, ascending. Hidden entries (staging directories) and
    /// names that are not versions are skipped.
    pub fn list(&self) -> Result<Vec<Version>> {
        let entries = match fs_err::read_dir(&self.versions) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GvsError::io_at(&self.versions, "listing installed versions", e))
            }
        };
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| GvsError::io("listing installed versions", e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            match name.parse::<Version>() {
                Ok(v) if v.to_string() == name => found.push(v),
                _ => debug!(entry = %name, "ignoring non-version entry in versions dir"),
            }
        }
        found.sort();
        Ok(found)
    }

    pub fn is_installed(&self, version: Version) -> bool {
        self.version_dir(version).is_dir()
    }

    pub fn inspect(&self) -> Result<ActiveState> {
        let meta = match self.active.symlink_metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ActiveState::Absent),
            Err(e) => {
                let context = format!("inspecting {}", self.active.display());
                return Err(GvsError::io_at(&self.active, context, e));
            }
        };
        if meta.file_type().is_symlink() {
            let target = fs_err::read_link(&self.active)
                .map_err(|e| GvsError::io(format!("reading link {}", self.active.display()), e))?;
            let target = match (target.is_relative(), self.active.parent()) {
                (true, Some(parent)) => parent.join(target),
                _ => target,
            };
            if let Some(version) = self.managed_version(&target) {
                return Ok(if target.is_dir() {
                    ActiveState::Managed(version)
                } else {
                    ActiveState::Dangling(version)
                });
            }
        }
        Ok(ActiveState::Unmanaged {
            path: self.active.clone(),
            version: self.read_version_file(&self.active),
        })
    }

    /// The active version, if the active path is a live managed link.
    pub fn current(&self) -> Result<Option<Version>> {
        Ok(match self.inspect()? {
            ActiveState::Managed(v) => Some(v),
            _ => None,
        })
    }

    /// Point the active path at `version`. Replacing an unmanaged occupant is
    /// destructive and only happens if `confirm` accepts.
    pub fn switch(&self, version: Version, confirm: &dyn Confirm) -> Result<SwitchOutcome> {
        if !self.is_installed(version) {
            return Err(GvsError::VersionNotInstalled {
                version: version.to_string(),
            });
        }
        let _lock = self.lock()?;
        let state = self.inspect()?;
        let replace_occupant = match &state {
            ActiveState::Managed(cur) if *cur == version => {
                debug!(%version, "already active");
                return Ok(SwitchOutcome::AlreadyActive);
            }
            ActiveState::Unmanaged { path, version: found } => {
                let prompt = Prompt::ReplaceUnmanaged {
                    path: path.clone(),
                    version: *found,
                };
                if !confirm.confirm(&prompt) {
                    warn!(path = %path.display(), "left unmanaged installation in place");
                    return Ok(SwitchOutcome::Declined);
                }
                true
            }
            _ => false,
        };

        let tmp = self.sibling(&format!("{}.tmp", std::process::id()));
        if tmp.symlink_metadata().is_ok() {
            remove_entry(&tmp)?;
        }
        let dir = self.version_dir(version);
        let target = std::path::absolute(&dir)
            .map_err(|e| GvsError::io(format!("resolving {}", dir.display()), e))?;
        platform()
            .link_dir(&target, &tmp)
            .map_err(|e| GvsError::io_at(&tmp, format!("creating link {}", tmp.display()), e))?;

        if replace_occupant {
            if let Err(e) = remove_entry(&self.active) {
                let _ = platform().remove_link(&tmp);
                return Err(e);
            }
            info!(path = %self.active.display(), "removed unmanaged installation");
        }
        if let Err(e) = fs_err::rename(&tmp, &self.active) {
            let _ = platform().remove_link(&tmp);
            return Err(GvsError::io_at(
                &self.active,
                format!("activating {}", self.active.display()),
                e,
            ));
        }
        info!(%version, link = %self.active.display(), "switched active version");
        Ok(SwitchOutcome::Switched)
    }

    /// Remove a managed link, leaving the version directory alone. Returns
    /// whether anything was removed; unmanaged occupants are never touched.
    pub fn unlink(&self) -> Result<bool> {
        let _lock = self.lock()?;
        match self.inspect()? {
            ActiveState::Managed(_) | ActiveState::Dangling(_) => {
                platform().remove_link(&self.active).map_err(|e| {
                    let context = format!("removing link {}", self.active.display());
                    GvsError::io_at(&self.active, context, e)
                })?;
                info!(link = %self.active.display(), "unlinked active version");
                Ok(true)
            }
            ActiveState::Absent | ActiveState::Unmanaged { .. } => Ok(false),
        }
    }

    /// Delete an installed version. The active version must be unlinked first.
    pub fn remove_version(&self, version: Version) -> Result<()> {
        if !self.is_installed(version) {
            return Err(GvsError::VersionNotInstalled {
                version: version.to_string(),
            });
        }
        let _lock = self.lock()?;
        if self.current()? == Some(version) {
            return Err(GvsError::VersionActive {
                version: version.to_string(),
            });
        }
        let dir = self.version_dir(version);
        fs_err::remove_dir_all(&dir)
            .map_err(|e| GvsError::io_at(&dir, format!("removing {}", dir.display()), e))?;
        info!(%version, "removed installed version");
        Ok(())
    }

    /// Delete whatever unmanaged occupant sits at the active path.
    pub fn remove_unmanaged(&self) -> Result<bool> {
        let _lock = self.lock()?;
        match self.inspect()? {
            ActiveState::Unmanaged { path, .. } => {
                remove_entry(&path)?;
                info!(path = %path.display(), "removed unmanaged installation");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn lock(&self) -> Result<LockGuard> {
        if let Some(parent) = self.active.parent() {
            ensure_dir(parent)?;
        }
        LockGuard::acquire(&self.sibling("lock"))
    }

    /// Hidden file next to the active path: `.<name>.<suffix>`.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .active
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "active".to_string());
        let parent = self.active.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{name}.{suffix}"))
    }

    fn managed_version(&self, target: &Path) -> Option<Version> {
        let parent = target.parent()?;
        let same_root = parent == self.versions
            || matches!(
                (fs_err::canonicalize(parent), fs_err::canonicalize(&self.versions)),
                (Ok(a), Ok(b)) if a == b
            );
        if !same_root {
            return None;
        }
        let name = target.file_name()?.to_str()?;
        name.parse().ok()
    }

    fn read_version_file(&self, dir: &Path) -> Option<Version> {
        let text = std::fs::read_to_string(dir.join("VERSION")).ok()?;
        let first = text.lines().next()?;
        Version::parse_with_prefix(first, &self.prefix).ok()
    }
}

/// Remove a file, a symlink (not its target) or a directory tree.
fn remove_entry(path: &Path) -> Result<()> {
    let meta = path
        .symlink_metadata()
        .map_err(|e| GvsError::io_at(path, format!("inspecting {}", path.display()), e))?;
    let result = if meta.file_type().is_symlink() {
        platform().remove_link(path)
    } else if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| GvsError::io_at(path, format!("removing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::tests::Recorder;
    use crate::confirm::AutoYes;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn setup(installed: &[&str]) -> (tempfile::TempDir, InstalledVersionRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_root(dir.path().to_path_buf());
        for version in installed {
            let d = paths.versions.join(version);
            std::fs::create_dir_all(d.join("bin")).unwrap();
            std::fs::write(d.join("VERSION"), format!("go{version}\n")).unwrap();
            std::fs::write(d.join("bin").join("go"), format!("payload {version}")).unwrap();
        }
        let registry = InstalledVersionRegistry::new(&paths, "go");
        (dir, registry)
    }

    #[test]
    fn list_is_numeric_and_skips_foreign_entries() {
        let (_dir, reg) = setup(&["1.10.0", "1.9.2", "1.21.0"]);
        std::fs::create_dir_all(reg.versions_dir().join(".1.22.0.staging1234")).unwrap();
        std::fs::create_dir_all(reg.versions_dir().join("notes")).unwrap();
        std::fs::write(reg.versions_dir().join("1.5.0"), "a file").unwrap();
        assert_eq!(reg.list().unwrap(), vec![v("1.9.2"), v("1.10.0"), v("1.21.0")]);
    }

    #[test]
    fn empty_root_lists_nothing_and_has_no_current() {
        let (_dir, reg) = setup(&[]);
        assert!(reg.list().unwrap().is_empty());
        assert_eq!(reg.inspect().unwrap(), ActiveState::Absent);
        assert_eq!(reg.current().unwrap(), None);
    }

    #[test]
    fn switch_to_missing_version_fails_and_changes_nothing() {
        let (_dir, reg) = setup(&[]);
        let err = reg.switch(v("9.9.9"), &AutoYes).unwrap_err();
        assert!(matches!(err, GvsError::VersionNotInstalled { .. }), "{err:?}");
        assert_eq!(reg.current().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn switching_back_and_forth_leaves_payload_untouched() {
        let (_dir, reg) = setup(&["1.20.0", "1.21.0"]);
        let payload = reg.version_dir(v("1.20.0")).join("bin").join("go");
        let before = std::fs::metadata(&payload).unwrap().modified().unwrap();

        assert_eq!(reg.switch(v("1.20.0"), &AutoYes).unwrap(), SwitchOutcome::Switched);
        assert_eq!(reg.current().unwrap(), Some(v("1.20.0")));
        assert_eq!(reg.switch(v("1.21.0"), &AutoYes).unwrap(), SwitchOutcome::Switched);
        assert_eq!(reg.current().unwrap(), Some(v("1.21.0")));
        assert_eq!(reg.switch(v("1.20.0"), &AutoYes).unwrap(), SwitchOutcome::Switched);
        assert_eq!(reg.current().unwrap(), Some(v("1.20.0")));

        assert_eq!(std::fs::read_to_string(&payload).unwrap(), "payload 1.20.0");
        assert_eq!(std::fs::metadata(&payload).unwrap().modified().unwrap(), before);
        // reading through the link reaches the payload
        let through_link = reg.active_path().join("bin").join("go");
        assert_eq!(std::fs::read_to_string(through_link).unwrap(), "payload 1.20.0");
    }

    #[cfg(unix)]
    #[test]
    fn switching_to_the_active_version_is_a_no_op() {
        let (_dir, reg) = setup(&["1.21.0"]);
        reg.switch(v("1.21.0"), &AutoYes).unwrap();
        let asked = Recorder::new(false);
        assert_eq!(reg.switch(v("1.21.0"), &asked).unwrap(), SwitchOutcome::AlreadyActive);
        assert!(asked.seen.borrow().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unmanaged_occupant_needs_confirmation() {
        let (_dir, reg) = setup(&["1.21.0"]);
        let occupant = reg.active_path().to_path_buf();
        std::fs::create_dir_all(occupant.join("bin")).unwrap();
        std::fs::write(occupant.join("VERSION"), "go1.19.4\ntime 2022-12-06\n").unwrap();
        assert_eq!(
            reg.inspect().unwrap(),
            ActiveState::Unmanaged {
                path: occupant.clone(),
                version: Some(v("1.19.4")),
            }
        );

        let no = Recorder::new(false);
        assert_eq!(reg.switch(v("1.21.0"), &no).unwrap(), SwitchOutcome::Declined);
        assert_eq!(no.seen.borrow().len(), 1);
        assert!(occupant.join("VERSION").is_file());
        assert_eq!(reg.current().unwrap(), None);

        let yes = Recorder::new(true);
        assert_eq!(reg.switch(v("1.21.0"), &yes).unwrap(), SwitchOutcome::Switched);
        assert_eq!(reg.current().unwrap(), Some(v("1.21.0")));
    }

    #[cfg(unix)]
    #[test]
    fn relative_root_still_yields_a_live_link() {
        let dir = tempfile::Builder::new().prefix(".gvs-rel").tempdir_in(".").unwrap();
        let root = PathBuf::from(dir.path().file_name().unwrap());
        let paths = Paths::with_root(root);
        std::fs::create_dir_all(paths.versions.join("1.21.0").join("bin")).unwrap();
        let reg = InstalledVersionRegistry::new(&paths, "go");

        assert_eq!(reg.switch(v("1.21.0"), &AutoYes).unwrap(), SwitchOutcome::Switched);
        assert!(fs_err::read_link(&paths.active).unwrap().is_absolute());
        assert!(paths.active.join("bin").is_dir());
        assert_eq!(reg.inspect().unwrap(), ActiveState::Managed(v("1.21.0")));
        assert_eq!(reg.current().unwrap(), Some(v("1.21.0")));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_link_is_replaced_without_prompting() {
        let (_dir, reg) = setup(&["1.20.0", "1.21.0"]);
        reg.switch(v("1.20.0"), &AutoYes).unwrap();
        std::fs::remove_dir_all(reg.version_dir(v("1.20.0"))).unwrap();
        assert_eq!(reg.inspect().unwrap(), ActiveState::Dangling(v("1.20.0")));
        assert_eq!(reg.current().unwrap(), None);

        let asked = Recorder::new(false);
        assert_eq!(reg.switch(v("1.21.0"), &asked).unwrap(), SwitchOutcome::Switched);
        assert!(asked.seen.borrow().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn active_version_cannot_be_removed_until_unlinked() {
        let (_dir, reg) = setup(&["1.21.0"]);
        reg.switch(v("1.21.0"), &AutoYes).unwrap();
        let err = reg.remove_version(v("1.21.0")).unwrap_err();
        assert!(matches!(err, GvsError::VersionActive { .. }));

        assert!(reg.unlink().unwrap());
        assert_eq!(reg.inspect().unwrap(), ActiveState::Absent);
        assert!(reg.is_installed(v("1.21.0")));
        reg.remove_version(v("1.21.0")).unwrap();
        assert!(!reg.is_installed(v("1.21.0")));
    }

    #[test]
    fn unlink_leaves_unmanaged_occupants_alone() {
        let (_dir, reg) = setup(&[]);
        std::fs::create_dir_all(reg.active_path()).unwrap();
        assert!(!reg.unlink().unwrap());
        assert!(reg.active_path().is_dir());
        assert!(reg.remove_unmanaged().unwrap());
        assert_eq!(reg.inspect().unwrap(), ActiveState::Absent);
    }
}

use crate::errors::{GvsError, Result};
use crate::fsutil::ensure_dir;
use crate::platform::platform;
use flate2::read::GzDecoder;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};

/// Extract a `.tar.gz` release archive into `target_dir`, dropping the
/// archive's single top-level directory (`go/bin/go` lands at
/// `<target_dir>/bin/go`).
///
/// Extraction happens in a hidden sibling staging directory that is renamed
/// to `target_dir` only once every entry has been written, so a corrupt
/// archive or an interrupted run never leaves a half-populated `target_dir`.
/// `target_dir` must not exist yet.
pub fn install(archive_path: &Path, target_dir: &Path) -> Result<()> {
    if target_dir.symlink_metadata().is_ok() {
        return Err(GvsError::io(
            format!("installing into {}", target_dir.display()),
            std::io::Error::new(ErrorKind::AlreadyExists, "target directory already exists"),
        ));
    }
    let parent = target_dir.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;

    let name = target_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "install".to_string());
    let staging = tempfile::Builder::new()
        .prefix(&format!(".{name}.staging"))
        .tempdir_in(parent)
        .map_err(|e| {
            GvsError::io_at(parent, format!("creating staging dir in {}", parent.display()), e)
        })?;

    let files = extract_stripped(archive_path, staging.path())?;
    debug!(archive = %archive_path.display(), files, "extracted into staging");

    platform()
        .make_executable(staging.path())
        .map_err(|e| GvsError::io_at(staging.path(), "setting permissions on staging dir", e))?;
    fs_err::rename(staging.path(), target_dir).map_err(|e| {
        let context = format!("moving staged install to {}", target_dir.display());
        GvsError::io_at(target_dir, context, e)
    })?;
    // `staging` now points at nothing; its drop is a no-op.
    info!(target = %target_dir.display(), "installed");
    Ok(())
}

fn extract_stripped(archive_path: &Path, dest: &Path) -> Result<usize> {
    let corrupt = |message: String| GvsError::ExtractionFailed {
        archive: archive_path.to_path_buf(),
        message,
    };

    let file = fs_err::File::open(archive_path)
        .map_err(|e| GvsError::io(format!("opening archive {}", archive_path.display()), e))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut top: Option<PathBuf> = None;
    let mut written = 0usize;
    for entry in archive
        .entries()
        .map_err(|e| corrupt(format!("reading entries: {e}")))?
    {
        let mut entry = entry.map_err(|e| corrupt(format!("reading entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| corrupt(format!("entry path: {e}")))?
            .into_owned();

        if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(corrupt(format!(
                "refusing entry with absolute or parent reference: {}",
                path.display()
            )));
        }

        let mut components = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir));
        let Some(first) = components.next() else {
            continue;
        };
        let first = PathBuf::from(first.as_os_str());
        let expected = top.get_or_insert_with(|| first.clone());
        if *expected != first {
            return Err(corrupt(format!(
                "expected a single top-level directory, found {} and {}",
                expected.display(),
                first.display()
            )));
        }
        let relative: PathBuf = components.collect();
        if relative.as_os_str().is_empty() {
            continue;
        }

        let kind = entry.header().entry_type();
        if kind.is_hard_link() {
            return Err(corrupt(format!("refusing hard link entry {}", relative.display())));
        }
        if kind.is_symlink() {
            let target = entry
                .link_name()
                .map_err(|e| corrupt(format!("link target of {}: {e}", relative.display())))?
                .ok_or_else(|| corrupt(format!("symlink {} has no target", relative.display())))?
                .into_owned();
            if !link_stays_inside(&relative, &target) {
                return Err(corrupt(format!(
                    "refusing symlink {} -> {} pointing outside the archive",
                    relative.display(),
                    target.display()
                )));
            }
        }
        if let Some(link) = symlinked_prefix(dest, &relative) {
            return Err(corrupt(format!(
                "refusing to write {} through symlink {}",
                relative.display(),
                link.display()
            )));
        }

        let out = dest.join(&relative);
        if let Some(parent) = out.parent() {
            ensure_dir(parent)?;
        }
        entry.unpack(&out).map_err(|e| match e.kind() {
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof | ErrorKind::InvalidInput => {
                corrupt(format!("{}: {e}", relative.display()))
            }
            _ => GvsError::io_at(&out, format!("writing {}", out.display()), e),
        })?;
        written += 1;
    }

    if written == 0 {
        return Err(corrupt(
            "archive contains no files under a top-level directory".to_string(),
        ));
    }
    Ok(written)
}

/// Whether a symlink at `link` (relative to the extraction root) pointing at
/// `target` resolves to somewhere inside that root, judged lexically.
fn link_stays_inside(link: &Path, target: &Path) -> bool {
    let mut depth = link
        .parent()
        .map(|p| p.components().filter(|c| matches!(c, Component::Normal(_))).count())
        .unwrap_or(0);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// The first already-extracted path along `relative` that is a symlink.
fn symlinked_prefix(dest: &Path, relative: &Path) -> Option<PathBuf> {
    let mut cursor = dest.to_path_buf();
    for component in relative.components() {
        cursor.push(component);
        match cursor.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() => return Some(cursor),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}

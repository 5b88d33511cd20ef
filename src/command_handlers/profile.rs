use gvs::config::Context;
use gvs::errors::{GvsError, Result};
use gvs::orchestrator::EnvCleanup;
use gvs::platform::platform;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `remove --purge-env`: drop lines that mention the active path (PATH or
/// GOROOT exports) from the user's shell profiles. Profiles that do not exist
/// are skipped; nothing new is created.
pub struct ProfileCleanup;

impl EnvCleanup for ProfileCleanup {
    fn purge(&self, ctx: &Context) -> Result<()> {
        let Some(home) = platform().home_dir() else {
            warn!("cannot determine home directory; shell profiles left untouched");
            return Ok(());
        };
        let needle = ctx.paths.active.display().to_string();
        let mut touched = 0;
        for path in profile_candidates(&home) {
            let text = match fs_err::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    debug!(profile = %path.display(), "skipping: {e}");
                    continue;
                }
            };
            if let Some(cleaned) = strip_references(&text, &needle) {
                fs_err::write(&path, cleaned).map_err(|e| {
                    GvsError::io_at(&path, format!("rewriting {}", path.display()), e)
                })?;
                println!("Removed references to {needle} from {}", path.display());
                touched += 1;
            }
        }
        if touched == 0 {
            println!("No shell profile references to {needle} found");
        }
        Ok(())
    }
}

fn profile_candidates(home: &Path) -> Vec<PathBuf> {
    vec![
        home.join(".bashrc"),
        home.join(".zshrc"),
        home.join(".profile"),
        home.join(".bash_profile"),
        home.join(".zprofile"),
        home.join(".config/fish/config.fish"),
    ]
}

/// `text` without the lines containing `needle`, or `None` if there are none.
fn strip_references(text: &str, needle: &str) -> Option<String> {
    if needle.is_empty() || !text.contains(needle) {
        return None;
    }
    let mut out: String = text
        .lines()
        .filter(|line| !line.contains(needle))
        .collect::<Vec<_>>()
        .join("\n");
    if text.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    Some(out)
}

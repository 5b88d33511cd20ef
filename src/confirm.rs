//! Yes/no decisions for destructive steps.
//!
//! Core operations never read stdin themselves; they ask a [`Confirm`] policy
//! about a named [`Prompt`]. The command layer picks the policy from the
//! `--yes` / `--no` flags, falling back to an interactive prompt.

use crate::version::Version;
use std::fmt;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Something gvs did not create occupies the active path.
    ReplaceUnmanaged {
        path: PathBuf,
        version: Option<Version>,
    },
    /// A different managed version is active.
    ReplaceActive { current: Version, next: Version },
    RemoveActive { version: Option<Version>, path: PathBuf },
    RemoveVersion { version: Version },
    ClearCache { entries: usize },
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::ReplaceUnmanaged { path, version } => match version {
                Some(v) => write!(
                    f,
                    "{} holds an installation not managed by gvs (version {v}). Replace it?",
                    path.display()
                ),
                None => write!(
                    f,
                    "{} exists and is not managed by gvs. Replace it?",
                    path.display()
                ),
            },
            Prompt::ReplaceActive { current, next } => {
                write!(f, "Version {current} is active. Switch to {next}?")
            }
            Prompt::RemoveActive { version, path } => match version {
                Some(v) => write!(f, "Remove the active installation {v} at {}?", path.display()),
                None => write!(f, "Remove the active installation at {}?", path.display()),
            },
            Prompt::RemoveVersion { version } => write!(f, "Remove installed version {version}?"),
            Prompt::ClearCache { entries } => {
                write!(f, "Delete {entries} cached file(s)?")
            }
        }
    }
}

pub trait Confirm {
    fn confirm(&self, prompt: &Prompt) -> bool;
}

/// Accept everything (`--yes`).
pub struct AutoYes;

impl Confirm for AutoYes {
    fn confirm(&self, _prompt: &Prompt) -> bool {
        true
    }
}

/// Decline everything (`--no`).
pub struct AutoNo;

impl Confirm for AutoNo {
    fn confirm(&self, prompt: &Prompt) -> bool {
        warn!(%prompt, "declined (--no)");
        false
    }
}

/// Ask on the terminal. Declines when stdin is not a terminal so scripted runs
/// never block or destroy anything without `--yes`.
pub struct Prompter;

impl Confirm for Prompter {
    fn confirm(&self, prompt: &Prompt) -> bool {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            warn!(%prompt, "stdin is not a terminal; declining (pass --yes to accept)");
            return false;
        }
        eprint!("{prompt} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() {
            return false;
        }
        parse_answer(&line)
    }
}

fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

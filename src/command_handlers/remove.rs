use anyhow::{Context as _, Result};
use gvs::orchestrator::{Orchestrator, RemoveOutcome};
use gvs::version::Version;

pub fn run_remove(gvs: &Orchestrator, version: Option<Version>, purge_env: bool) -> Result<()> {
    let outcome = gvs.remove(version, purge_env).context("removing installation")?;
    match outcome {
        RemoveOutcome::Removed {
            version: Some(v),
            path,
        } => println!("Removed {v} ({})", path.display()),
        RemoveOutcome::Removed { version: None, path } => println!("Removed {}", path.display()),
        RemoveOutcome::Declined => println!("Nothing removed"),
    }
    Ok(())
}

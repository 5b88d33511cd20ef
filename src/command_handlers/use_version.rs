use anyhow::{Context as _, Result};
use gvs::orchestrator::Orchestrator;
use gvs::registry::SwitchOutcome;
use gvs::version::Version;

pub fn run_use(gvs: &Orchestrator, version: Version) -> Result<()> {
    match gvs
        .use_version(version)
        .with_context(|| format!("switching to {version}"))?
    {
        SwitchOutcome::Switched => println!("Now using {version}"),
        SwitchOutcome::AlreadyActive => println!("{version} is already active"),
        SwitchOutcome::Declined => println!("Left the active installation unchanged"),
    }
    Ok(())
}

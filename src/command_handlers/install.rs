use anyhow::{Context as _, Result};
use gvs::cache::Verification;
use gvs::orchestrator::{InstallReport, Orchestrator, UpdateReport};
use gvs::registry::SwitchOutcome;
use gvs::version::Version;

pub fn run_install(gvs: &Orchestrator, version: Option<Version>) -> Result<()> {
    let what = version.map_or_else(|| "latest version".to_string(), |v| format!("version {v}"));
    let report = gvs
        .install(version)
        .with_context(|| format!("installing {what}"))?;
    print_report(gvs, &report);
    Ok(())
}

pub fn run_update(gvs: &Orchestrator) -> Result<()> {
    match gvs.update().context("updating")? {
        UpdateReport::UpToDate(v) => println!("Already up to date ({v})"),
        UpdateReport::Updated { from, report } => {
            println!("Updating {from} -> {}", report.version);
            print_report(gvs, &report);
        }
    }
    Ok(())
}

fn print_report(gvs: &Orchestrator, report: &InstallReport) {
    let v = report.version;
    match &report.fetched {
        None => println!("Version {v} is already installed"),
        Some(Verification::Verified { sha256 }) => {
            println!("Installed {v} (sha256 {sha256} verified)")
        }
        Some(Verification::Unverified { reason }) => {
            println!("Installed {v} (not verified: {reason})")
        }
        Some(Verification::CacheHit) => println!("Installed {v} from cache"),
    }
    let active = gvs.context().paths.active.display();
    match report.switch {
        SwitchOutcome::Switched => println!("Now using {v} via {active}"),
        SwitchOutcome::AlreadyActive => println!("{v} is already active"),
        SwitchOutcome::Declined => {
            println!("Left the active installation unchanged; run 'gvs use {v}' to switch")
        }
    }
}

use anyhow::{Context as _, Result};
use gvs::orchestrator::Orchestrator;

pub fn list_installed(gvs: &Orchestrator) -> Result<()> {
    let (installed, current) = gvs.list().context("listing installed versions")?;
    if installed.is_empty() {
        println!("No versions installed");
        return Ok(());
    }
    for v in installed {
        let marker = if current == Some(v) { "*" } else { " " };
        println!("{marker} {v}");
    }
    Ok(())
}

pub fn list_available(gvs: &Orchestrator) -> Result<()> {
    let platform = gvs.context().platform;
    let versions = gvs
        .versions()
        .with_context(|| format!("listing versions for {platform}"))?;
    let (installed, _) = gvs.list().unwrap_or_default();
    for v in versions {
        if installed.contains(&v) {
            println!("{v} (installed)");
        } else {
            println!("{v}");
        }
    }
    Ok(())
}

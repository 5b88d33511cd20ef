use anyhow::{Context as _, Result};
use gvs::orchestrator::{Orchestrator, Status};
use gvs::registry::ActiveState;
use serde_json::json;

pub fn print_status(gvs: &Orchestrator, as_json: bool) -> Result<()> {
    let status = gvs.status().context("reading local state")?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&to_json(gvs, &status))?);
        return Ok(());
    }

    let ctx = gvs.context();
    println!("platform:  {}", ctx.platform);
    println!("root:      {}", ctx.paths.root.display());
    println!("versions:  {}", ctx.paths.versions.display());
    println!("cache:     {}", ctx.paths.cache.display());
    println!("active:    {}", ctx.paths.active.display());
    match &status.active {
        ActiveState::Absent => println!("current:   none"),
        ActiveState::Managed(v) => println!("current:   {v}"),
        ActiveState::Dangling(v) => println!("current:   {v} (missing; run 'gvs install {v}')"),
        ActiveState::Unmanaged { version, .. } => match version {
            Some(v) => println!("current:   {v} (not managed by gvs)"),
            None => println!("current:   unknown (not managed by gvs)"),
        },
    }
    let installed: Vec<String> = status.installed.iter().map(ToString::to_string).collect();
    if installed.is_empty() {
        println!("installed: none");
    } else {
        println!("installed: {}", installed.join(", "));
    }
    let bytes: u64 = status.cache.iter().map(|e| e.size).sum();
    println!("cached:    {} archive(s), {bytes} bytes", status.cache.len());
    Ok(())
}

fn to_json(gvs: &Orchestrator, status: &Status) -> serde_json::Value {
    let ctx = gvs.context();
    let (state, version) = match &status.active {
        ActiveState::Absent => ("absent", None),
        ActiveState::Managed(v) => ("managed", Some(v.to_string())),
        ActiveState::Dangling(v) => ("dangling", Some(v.to_string())),
        ActiveState::Unmanaged { version, .. } => ("unmanaged", version.map(|v| v.to_string())),
    };
    json!({
        "platform": ctx.platform.to_string(),
        "paths": {
            "root": ctx.paths.root.display().to_string(),
            "versions": ctx.paths.versions.display().to_string(),
            "cache": ctx.paths.cache.display().to_string(),
            "active": ctx.paths.active.display().to_string(),
        },
        "active": { "state": state, "version": version },
        "installed": status.installed.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "cache": status.cache.iter().map(|e| json!({
            "name": e.name,
            "size": e.size,
            "modified": e.modified.map(|m| m.to_rfc3339()),
        })).collect::<Vec<_>>(),
    })
}

use anyhow::{Context as _, Result};
use gvs::orchestrator::Orchestrator;

pub fn list(gvs: &Orchestrator) -> Result<()> {
    let entries = gvs.cache_entries().context("reading cache")?;
    if entries.is_empty() {
        println!("Cache is empty ({})", gvs.context().paths.cache.display());
        return Ok(());
    }
    for e in &entries {
        let modified = e
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<40} {:>10}  {modified}", e.name, human_size(e.size));
    }
    let total: u64 = entries.iter().map(|e| e.size).sum();
    println!("{} archive(s), {}", entries.len(), human_size(total));
    Ok(())
}

pub fn clean(gvs: &Orchestrator) -> Result<()> {
    match gvs.clean_cache().context("cleaning cache")? {
        Some(0) => println!("Cache is already empty"),
        Some(n) => println!("Removed {n} cached archive(s)"),
        None => println!("Cache left untouched"),
    }
    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

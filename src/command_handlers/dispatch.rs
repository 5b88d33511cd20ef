use crate::cli::{CacheCommands, Cli, Commands};
use crate::command_handlers::{cache, install, list, profile, remove, status, use_version};
use anyhow::{Context as _, Result};
use gvs::config::Config;
use gvs::confirm::{AutoNo, AutoYes, Confirm, Prompter};
use gvs::fetch::HttpFetcher;
use gvs::orchestrator::Orchestrator;
use gvs::version::Version;

pub fn dispatch(cli: Cli) -> Result<()> {
    let cfg = Config::load(cli.config.as_deref())?;
    // Platform first: nothing below may touch the network or the disk on an
    // unsupported host.
    let platform = cfg.resolve_platform()?;
    let ctx = cfg.context(platform)?;
    let fetcher = HttpFetcher::new(ctx.network)
        .context("initializing HTTP client")?
        .with_progress(!cli.quiet);
    let confirm: &dyn Confirm = if cli.yes {
        &AutoYes
    } else if cli.no {
        &AutoNo
    } else {
        &Prompter
    };
    let env = profile::ProfileCleanup;
    let gvs = Orchestrator::new(&ctx, &fetcher, confirm, &env);
    let parse = |raw: &str| -> Result<Version> {
        Ok(Version::parse_with_prefix(raw, &ctx.endpoints.archive_prefix)?)
    };

    match cli.command {
        Commands::Install { version } => {
            let version = version.as_deref().map(parse).transpose()?;
            install::run_install(&gvs, version)
        }
        Commands::Update => install::run_update(&gvs),
        Commands::Remove { version, purge_env } => {
            let version = version.as_deref().map(parse).transpose()?;
            remove::run_remove(&gvs, version, purge_env)
        }
        Commands::Use { version } => use_version::run_use(&gvs, parse(&version)?),
        Commands::List => list::list_installed(&gvs),
        Commands::Versions => list::list_available(&gvs),
        Commands::Status { json } => status::print_status(&gvs, json),
        Commands::Cache { command } => match command {
            CacheCommands::List => cache::list(&gvs),
            CacheCommands::Clean => cache::clean(&gvs),
        },
    }
}

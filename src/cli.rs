use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    name = "gvs",
    about = "Install, cache and switch between versions of the Go toolchain"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config (defaults to ~/.gvs/config.toml, or $GVS_HOME/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true, conflicts_with = "no")]
    pub yes: bool,

    /// Answer no to every confirmation
    #[arg(long, global = true)]
    pub no: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors; hides download progress
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a version (latest when omitted) and make it active.
    /// Examples:
    ///   gvs install            # latest stable release
    ///   gvs install 1.21.3     # specific version
    ///   gvs install go1.20     # same as 1.20.0
    Install {
        #[arg(value_name = "VERSION")]
        version: Option<String>,
    },
    /// Remove the active installation, or a specific installed version
    Remove {
        #[arg(value_name = "VERSION")]
        version: Option<String>,
        /// Also strip shell profile lines that reference the active path
        #[arg(long)]
        purge_env: bool,
    },
    /// Install the latest release if it is newer than the active version
    Update,
    /// Switch the active version to an installed one
    Use {
        #[arg(value_name = "VERSION")]
        version: String,
    },
    /// List installed versions
    List,
    /// List versions published for this platform
    Versions,
    /// Show platform, directories, active version and cache contents
    Status {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Inspect or empty the archive cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List cached archives
    List,
    /// Delete cached archives and leftover partial downloads
    Clean,
}

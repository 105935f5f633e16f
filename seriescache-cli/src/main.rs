//! SeriesCache CLI - maintenance commands for the local series cache
//!
//! Fetching is done by the library's callers; this binary inspects and
//! clears what they have cached.
//!
//! ```bash
//! seriescache cache status
//! seriescache cache clear --endpoint indicators --indicator 600
//! seriescache -v config show
//! ```

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use seriescache::{default_config_path, CacheConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::cache::CacheAction;
use crate::commands::config::ConfigCommands;
use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "seriescache", version, about = "Inspect and maintain the local series cache")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache root, overriding the configuration file
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Inspect or clear cached data
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Resolved settings shared by every command.
pub struct Context {
    pub config_path: PathBuf,
    pub config: CacheConfig,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self, CliError> {
        let config_path = cli.config.clone().unwrap_or_else(default_config_path);
        let mut config = CacheConfig::load(&config_path)?;
        if let Some(dir) = &cli.cache_dir {
            config.cache_dir = dir.clone();
        }
        debug!(
            config = %config_path.display(),
            cache_dir = %config.cache_dir.display(),
            "Resolved configuration"
        );
        Ok(Self {
            config_path,
            config,
        })
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let context = Context::load(&cli)?;
    match cli.command {
        Commands::Cache { action } => commands::cache::run(action, &context),
        Commands::Config { command } => commands::config::run(command, &context),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

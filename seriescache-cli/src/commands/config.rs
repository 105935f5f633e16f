//! Configuration CLI commands.

use clap::Subcommand;

use crate::error::CliError;
use crate::Context;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, context: &Context) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", context.config_path.display());
        }
        ConfigCommands::Show => {
            let config = &context.config;
            let source = if context.config_path.exists() {
                context.config_path.display().to_string()
            } else {
                "(defaults)".to_string()
            };
            println!("# {}", source);
            println!("[cache]");
            println!("enabled = {}", config.enabled);
            println!("directory = {}", config.cache_dir.display());
            println!("recent_window_hours = {}", config.recent_window.num_hours());
            println!("metadata_ttl_days = {}", config.metadata_ttl.num_days());
            println!("catalog_ttl_hours = {}", config.catalog_ttl.num_hours());
            println!("chunk_days = {}", config.chunk_width.num_days());
            println!(
                "batching = {}",
                match config.batching {
                    seriescache::Batching::Grouped => "grouped",
                    seriescache::Batching::PerColumn => "per_column",
                }
            );
        }
    }
    Ok(())
}

//! Cache management CLI commands.

use clap::Subcommand;
use seriescache::maintenance::{self, ClearScope};
use seriescache::{CacheLayout, DimensionRegistry, IndicatorRef};

use crate::error::CliError;
use crate::Context;

/// Endpoint assumed when only `--indicator` is given.
const DEFAULT_ENDPOINT: &str = "indicators";

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show file counts and size per endpoint
    Status,

    /// Print the cache root directory
    Path,

    /// List learned dimension names
    Dimensions,

    /// Remove cached files
    Clear {
        /// Remove everything under the cache root
        #[arg(long, conflicts_with_all = ["endpoint", "indicator"])]
        all: bool,

        /// Limit to one endpoint (e.g. indicators)
        #[arg(long)]
        endpoint: Option<String>,

        /// Limit to one indicator of the endpoint (default endpoint: indicators)
        #[arg(long)]
        indicator: Option<u32>,
    },
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, context: &Context) -> Result<(), CliError> {
    let layout = CacheLayout::new(&context.config.cache_dir);

    match action {
        CacheAction::Status => {
            let status = maintenance::status(&layout)?;
            println!("Cache: {}", status.path.display());
            println!("  Files: {}", status.files);
            println!("  Size:  {}", format_size(status.total_bytes));
            for (endpoint, files) in &status.endpoints {
                println!("  {:<16} {} files", endpoint, files);
            }
            Ok(())
        }
        CacheAction::Path => {
            println!("{}", layout.root().display());
            Ok(())
        }
        CacheAction::Dimensions => {
            let registry = DimensionRegistry::open(&layout)?;
            if registry.is_empty() {
                println!("(no dimensions learned yet)");
            }
            for (id, name) in registry.iter() {
                println!("{:>8}  {}", id, name);
            }
            Ok(())
        }
        CacheAction::Clear {
            all,
            endpoint,
            indicator,
        } => {
            let scope = clear_scope(all, endpoint, indicator)?;
            let removed = maintenance::clear(&layout, &scope)?;
            println!("Removed {} files from {}", removed, layout.root().display());
            Ok(())
        }
    }
}

fn clear_scope(
    all: bool,
    endpoint: Option<String>,
    indicator: Option<u32>,
) -> Result<ClearScope, CliError> {
    match (all, endpoint, indicator) {
        (true, _, _) => Ok(ClearScope::All),
        (false, endpoint, Some(id)) => {
            let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
            Ok(ClearScope::Indicator(IndicatorRef::new(endpoint, id)))
        }
        (false, Some(endpoint), None) => Ok(ClearScope::Endpoint(endpoint)),
        (false, None, None) => Err(CliError::Usage(
            "nothing to clear: pass --all, --endpoint or --indicator".to_string(),
        )),
    }
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

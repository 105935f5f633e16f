//! CLI error type.

use seriescache::{CacheError, ConfigError};
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Arguments clap accepts but that do not form a valid request.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Settings(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

//! Error types for cache operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchError;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur while reading, fetching into, or writing the cache.
///
/// Only `Storage`, `Fetch` and `Migration` ever reach the caller of
/// [`FetchOrchestrator::get`](crate::FetchOrchestrator::get). `Corrupt` is
/// absorbed by the indicator store, which treats the artifact as missing.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Disk I/O failed while reading or writing an artifact.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An artifact exists but cannot be decoded.
    #[error("corrupt cache artifact {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The fetch collaborator failed; passed through unchanged.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A legacy cache file exists but could not be migrated.
    #[error("failed to migrate legacy cache {}: {reason}", path.display())]
    Migration { path: PathBuf, reason: String },
}

impl CacheError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn migration(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Migration {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that leave the cache untouched but mean the artifact
    /// should be treated as absent.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

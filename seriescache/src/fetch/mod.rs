//! Seams to the remote source.
//!
//! The cache never talks to the network itself. A [`Fetcher`] turns one
//! `(columns, range)` request into raw bytes, and a [`Decoder`] turns those
//! bytes into observations. Both are injected, so tests can substitute
//! scripted sources and callers can bring their own transport, retries and
//! rate limiting.

mod values;

pub use values::ValuesDecoder;

use thiserror::Error;

use crate::interval::TimeRange;
use crate::table::{ColumnKey, Observation};

/// Errors raised by the fetch collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request could not be completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source refused the request for rate-limiting reasons.
    #[error("rate limited by source{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// The response could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    }
}

/// Fetches one chunk from the source.
///
/// Implementations own their timeouts and retry policy. The orchestrator
/// calls this sequentially, once per chunk.
pub trait Fetcher: Send + Sync {
    /// Fetch `columns` over `range`.
    ///
    /// # Arguments
    ///
    /// * `columns` - Columns to request; a whole-series key asks for every
    ///   dimension value
    /// * `range` - Half-open range no wider than the configured chunk width
    ///
    /// # Returns
    ///
    /// The raw response body.
    fn fetch(&self, columns: &[ColumnKey], range: &TimeRange) -> Result<Vec<u8>, FetchError>;
}

impl<F> Fetcher for F
where
    F: Fn(&[ColumnKey], &TimeRange) -> Result<Vec<u8>, FetchError> + Send + Sync,
{
    fn fetch(&self, columns: &[ColumnKey], range: &TimeRange) -> Result<Vec<u8>, FetchError> {
        self(columns, range)
    }
}

/// Decodes a raw response into observations.
pub trait Decoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<Vec<Observation>, FetchError>;
}

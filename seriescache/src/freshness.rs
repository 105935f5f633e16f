//! Freshness classification for cached ranges.
//!
//! The source publishes values and then corrects them for a while after
//! settlement. Coverage alone therefore cannot say whether a cached value is
//! still current: anything inside the trailing correction window must be
//! re-fetched once time has moved on, and anything that was still inside
//! the window when it was last fetched is revalidated once the metadata TTL
//! expires.

use chrono::Duration;

use crate::config::CacheConfig;
use crate::interval::{TimeRange, Timestamp};

/// Outcome of a freshness check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Everything requested is cached and settled.
    Fresh,
    /// Everything requested is cached, but this trailing part may have been
    /// corrected since it was fetched.
    PartialRefetchNeeded(TimeRange),
    /// Part of the request is not cached, or the metadata is too old to
    /// trust. `revalidate` is a trailing part that must be re-fetched even
    /// where it is covered.
    StaleOrMissing { revalidate: Option<TimeRange> },
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }

    /// The range that must be re-fetched regardless of coverage.
    pub fn revalidate(&self) -> Option<TimeRange> {
        match self {
            Self::Fresh => None,
            Self::PartialRefetchNeeded(range) => Some(*range),
            Self::StaleOrMissing { revalidate } => *revalidate,
        }
    }
}

/// Static freshness parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub recent_window: Duration,
    pub metadata_ttl: Duration,
    pub catalog_ttl: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl FreshnessPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            recent_window: config.recent_window,
            metadata_ttl: config.metadata_ttl,
            catalog_ttl: config.catalog_ttl,
        }
    }

    /// Classify a request.
    ///
    /// # Arguments
    ///
    /// * `now` - Current wall-clock time
    /// * `requested` - Requested range
    /// * `covered` - Whether every requested column's coverage contains `requested`
    /// * `fetched_at` - Time of the last successful merge, if any
    pub fn classify(
        &self,
        now: Timestamp,
        requested: TimeRange,
        covered: bool,
        fetched_at: Option<Timestamp>,
    ) -> Freshness {
        if requested.is_empty() {
            return Freshness::Fresh;
        }
        let Some(fetched_at) = fetched_at else {
            return Freshness::StaleOrMissing { revalidate: None };
        };

        // Values still correctable now, if anything happened since the fetch.
        let recent = if fetched_at < now {
            requested.trailing_from(now - self.recent_window)
        } else {
            None
        };

        // Values that were still correctable when fetched, once TTL expires.
        let expired = if now - fetched_at > self.metadata_ttl {
            requested.trailing_from(fetched_at - self.recent_window)
        } else {
            None
        };

        // Both are trailing parts of `requested`; the union is the longer one.
        let revalidate = match (recent, expired) {
            (Some(a), Some(b)) => Some(if a.start <= b.start { a } else { b }),
            (a, b) => a.or(b),
        };

        if !covered || expired.is_some() {
            Freshness::StaleOrMissing { revalidate }
        } else if let Some(range) = recent {
            Freshness::PartialRefetchNeeded(range)
        } else {
            Freshness::Fresh
        }
    }

    /// True if a catalog fetched at `fetched_at` may still be served.
    pub fn catalog_is_fresh(&self, now: Timestamp, fetched_at: Timestamp) -> bool {
        now - fetched_at <= self.catalog_ttl
    }
}

//! Per-endpoint catalog cache.
//!
//! Endpoint listings change rarely, so the last one fetched is kept at
//! `{root}/{endpoint}/catalog.json` and served until it is older than the
//! catalog TTL. The payload is opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::freshness::FreshnessPolicy;
use crate::interval::Timestamp;
use crate::storage::{atomic, CacheLayout};

/// A cached endpoint listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub fetched_at: Timestamp,
    pub payload: Value,
}

/// Reads and writes catalog artifacts.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    layout: CacheLayout,
    policy: FreshnessPolicy,
}

impl CatalogStore {
    pub fn new(layout: CacheLayout, policy: FreshnessPolicy) -> Self {
        Self { layout, policy }
    }

    /// The cached listing for `endpoint`, if present and within TTL.
    pub fn read(&self, endpoint: &str, now: Timestamp) -> CacheResult<Option<CatalogEntry>> {
        let path = self.layout.catalog_path(endpoint);
        let Some(bytes) = atomic::read(&path)? else {
            return Ok(None);
        };

        let entry: CatalogEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt catalog");
                return Ok(None);
            }
        };

        if !self.policy.catalog_is_fresh(now, entry.fetched_at) {
            debug!(endpoint, fetched_at = %entry.fetched_at, "Catalog expired");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Replace the cached listing for `endpoint`.
    pub fn write(&self, endpoint: &str, payload: Value, now: Timestamp) -> CacheResult<()> {
        let path = self.layout.catalog_path(endpoint);
        let entry = CatalogEntry {
            fetched_at: now,
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&entry).map_err(|e| CacheError::corrupt(&path, e))?;
        atomic::sweep_orphans(&self.layout.endpoint_dir(endpoint));
        atomic::write(&path, &bytes)
    }
}

//! One-time migration from the legacy flat-file layout.
//!
//! Older versions kept each indicator as a single `{endpoint}/{id}.bin` file
//! of records with no coverage information. On first access the records are
//! folded into the per-indicator directory, with coverage taken to be the
//! observed span and `fetched_at` taken from the legacy file's mtime, and the
//! legacy file is removed.

use std::collections::BTreeSet;
use std::fs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::atomic;
use super::indicator::{IndicatorState, IndicatorStore};
use crate::error::{CacheError, CacheResult};
use crate::interval::{TimeRange, Timestamp};
use crate::merge::{merge_chunk, FetchedChunk};
use crate::table::{Cell, ColumnKey, DimensionId, Observation, SeriesId};

/// One row of a legacy flat file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRecord {
    pub timestamp: Timestamp,
    pub series: SeriesId,
    pub dimension: Option<DimensionId>,
    pub value: Option<f64>,
}

/// Result of a migration check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    NotNeeded,
    Migrated { rows: usize, columns: usize },
}

/// Migrate the indicator if it exists only in the legacy layout.
///
/// On failure the legacy file is left in place and the next call retries.
pub fn migrate_if_needed(store: &IndicatorStore) -> CacheResult<MigrationOutcome> {
    if store.has_current_layout() {
        return Ok(MigrationOutcome::NotNeeded);
    }

    let legacy = &store.paths().legacy;
    let Some(bytes) = atomic::read(legacy)? else {
        return Ok(MigrationOutcome::NotNeeded);
    };

    let records: Vec<LegacyRecord> =
        bincode::deserialize(&bytes).map_err(|e| CacheError::migration(legacy, e))?;
    let modified = fs::metadata(legacy)
        .and_then(|m| m.modified())
        .map_err(|e| CacheError::migration(legacy, e))?;
    let fetched_at = DateTime::<Utc>::from(modified).fixed_offset();

    let rows = records.len();
    let state = fold_records(records, fetched_at);
    let columns = state.table.column_count();

    store.save(&state)?;
    atomic::remove(legacy)?;

    info!(
        indicator = %store.indicator(),
        rows,
        columns,
        "Migrated legacy cache file"
    );
    Ok(MigrationOutcome::Migrated { rows, columns })
}

fn fold_records(records: Vec<LegacyRecord>, fetched_at: Timestamp) -> IndicatorState {
    let mut state = IndicatorState::default();
    state.metadata.fetched_at = Some(fetched_at);

    let first = records.iter().map(|r| r.timestamp).min();
    let last = records.iter().map(|r| r.timestamp).max();
    let (Some(first), Some(last)) = (first, last) else {
        return state;
    };

    let columns: BTreeSet<ColumnKey> = records
        .iter()
        .map(|r| ColumnKey {
            series: r.series,
            dimension: r.dimension,
        })
        .collect();
    let observations = records
        .into_iter()
        .map(|r| {
            Observation::new(
                r.timestamp,
                ColumnKey {
                    series: r.series,
                    dimension: r.dimension,
                },
                Cell::from(r.value),
            )
        })
        .collect();

    merge_chunk(
        &mut state.table,
        &mut state.metadata.coverage,
        FetchedChunk {
            range: TimeRange::covering(first, last),
            columns: columns.into_iter().collect(),
            observations,
        },
    );
    state
}

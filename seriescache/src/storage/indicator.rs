//! Per-indicator persistence: the series table plus its coverage metadata.
//!
//! The table is written first and the metadata second. The metadata file is
//! what marks an indicator as present, so a crash between the two writes
//! leaves the previous metadata describing the previous table or a superset
//! of it, and coverage never claims more than is on disk.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::atomic;
use super::layout::{CacheLayout, IndicatorPaths, IndicatorRef};
use crate::coverage::{CoverageMetadata, FORMAT_VERSION};
use crate::error::{CacheError, CacheResult};
use crate::table::SeriesTable;

/// Everything cached for one indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorState {
    pub table: SeriesTable,
    pub metadata: CoverageMetadata,
}

#[derive(Serialize)]
struct StoredTableRef<'a> {
    format_version: u32,
    table: &'a SeriesTable,
}

#[derive(Deserialize)]
struct StoredTable {
    format_version: u32,
    table: SeriesTable,
}

/// Reads and writes one indicator's artifacts.
#[derive(Debug, Clone)]
pub struct IndicatorStore {
    indicator: IndicatorRef,
    paths: IndicatorPaths,
}

impl IndicatorStore {
    pub fn open(layout: &CacheLayout, indicator: IndicatorRef) -> Self {
        let paths = layout.indicator(&indicator);
        Self { indicator, paths }
    }

    pub fn indicator(&self) -> &IndicatorRef {
        &self.indicator
    }

    pub fn paths(&self) -> &IndicatorPaths {
        &self.paths
    }

    /// True once the indicator has been written in the current layout.
    pub fn has_current_layout(&self) -> bool {
        self.paths.metadata.exists()
    }

    /// Load the cached state.
    ///
    /// Missing or undecodable artifacts yield an empty state, which makes
    /// the next request refetch everything. Only I/O failures are errors.
    pub fn load(&self) -> CacheResult<IndicatorState> {
        atomic::sweep_orphans(&self.paths.dir);

        match self.try_load() {
            Ok(state) => Ok(state),
            Err(e) if e.is_corrupt() => {
                warn!(
                    indicator = %self.indicator,
                    error = %e,
                    "Discarding corrupt cache artifacts"
                );
                Ok(IndicatorState::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Load the cached state, reporting corrupt artifacts as errors.
    pub fn try_load(&self) -> CacheResult<IndicatorState> {
        let Some(meta_bytes) = atomic::read(&self.paths.metadata)? else {
            return Ok(IndicatorState::default());
        };
        let metadata: CoverageMetadata = serde_json::from_slice(&meta_bytes)
            .map_err(|e| CacheError::corrupt(&self.paths.metadata, e))?;
        if metadata.format_version != FORMAT_VERSION {
            return Err(CacheError::corrupt(
                &self.paths.metadata,
                format!("unsupported format version {}", metadata.format_version),
            ));
        }

        let Some(table_bytes) = atomic::read(&self.paths.table)? else {
            return Err(CacheError::corrupt(
                &self.paths.table,
                "metadata present but table missing",
            ));
        };
        let stored: StoredTable = bincode::deserialize(&table_bytes)
            .map_err(|e| CacheError::corrupt(&self.paths.table, e))?;
        if stored.format_version != FORMAT_VERSION {
            return Err(CacheError::corrupt(
                &self.paths.table,
                format!("unsupported format version {}", stored.format_version),
            ));
        }

        debug!(
            indicator = %self.indicator,
            columns = stored.table.column_count(),
            cells = stored.table.cell_count(),
            "Loaded cached indicator"
        );
        Ok(IndicatorState {
            table: stored.table,
            metadata,
        })
    }

    /// Persist the state: table first, then metadata.
    pub fn save(&self, state: &IndicatorState) -> CacheResult<()> {
        let table_bytes = bincode::serialize(&StoredTableRef {
            format_version: FORMAT_VERSION,
            table: &state.table,
        })
        .map_err(|e| CacheError::corrupt(&self.paths.table, e))?;
        atomic::write(&self.paths.table, &table_bytes)?;

        let meta_bytes = serde_json::to_vec_pretty(&state.metadata)
            .map_err(|e| CacheError::corrupt(&self.paths.metadata, e))?;
        atomic::write(&self.paths.metadata, &meta_bytes)?;

        debug!(
            indicator = %self.indicator,
            cells = state.table.cell_count(),
            "Saved indicator"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{TimeRange, Timestamp};
    use crate::table::{Cell, ColumnKey};
    use chrono::{FixedOffset, TimeZone};
    use std::fs;
    use tempfile::TempDir;

    fn day(d: u32) -> Timestamp {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, d, 0, 0, 0)
            .unwrap()
    }

    fn sample_state() -> IndicatorState {
        let key = ColumnKey::with_dimension(600, 3);
        let mut state = IndicatorState::default();
        state.table.insert(key, day(1), Cell::Value(42.5));
        state.table.insert(key, day(2), Cell::Absent);
        state
            .metadata
            .coverage
            .extend(key, TimeRange::new(day(1), day(3)));
        state.metadata.fetched_at = Some(day(3));
        state
    }

    fn store(temp: &TempDir) -> IndicatorStore {
        IndicatorStore::open(
            &CacheLayout::new(temp.path()),
            IndicatorRef::new("indicators", 600),
        )
    }

    #[test]
    fn test_missing_indicator_loads_empty() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        assert!(!store.has_current_layout());
        assert_eq!(store.load().unwrap(), IndicatorState::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let state = sample_state();

        store.save(&state).unwrap();

        assert!(store.has_current_layout());
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn test_blocked_table_write_is_storage_error() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        fs::create_dir_all(store.paths().table.join("in-use")).unwrap();

        let err = store.save(&sample_state()).unwrap_err();

        assert!(matches!(
            err,
            CacheError::Storage { ref path, .. } if *path == store.paths().table
        ));
        // The table is written first, so the metadata never appeared.
        assert!(!store.has_current_layout());
    }

    #[test]
    fn test_corrupt_metadata_is_treated_as_missing() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save(&sample_state()).unwrap();
        fs::write(&store.paths().metadata, b"{ not json").unwrap();

        assert!(store.try_load().unwrap_err().is_corrupt());
        assert_eq!(store.load().unwrap(), IndicatorState::default());
    }

    #[test]
    fn test_corrupt_table_is_treated_as_missing() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save(&sample_state()).unwrap();
        fs::write(&store.paths().table, b"\x01").unwrap();

        assert_eq!(store.load().unwrap(), IndicatorState::default());
    }

    #[test]
    fn test_metadata_without_table_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save(&sample_state()).unwrap();
        fs::remove_file(&store.paths().table).unwrap();

        assert!(store.try_load().unwrap_err().is_corrupt());
    }

    #[test]
    fn test_unknown_format_version_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let mut state = sample_state();
        state.metadata.format_version = FORMAT_VERSION + 1;
        store.save(&state).unwrap();

        assert!(store.try_load().unwrap_err().is_corrupt());
    }
}

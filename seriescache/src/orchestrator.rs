//! Chunked fetch orchestrator.
//!
//! Drives one indicator's cache through a request:
//!
//! 1. migrate a legacy flat file, if that is all there is
//! 2. load the cached table and coverage
//! 3. classify freshness and compute gap tasks
//! 4. split each task into chunks no wider than the configured width and
//!    fetch them one at a time
//! 5. merge and persist after every chunk, so a failure loses at most the
//!    chunk in flight
//! 6. return the requested slice
//!
//! The dimension registry is flushed at the end of every call, including
//! calls that fail part-way.
//!
//! With the cache disabled in [`CacheConfig`], steps 1, 2 and the persisting
//! half of 5 are skipped: the whole range is fetched in chunks, merged into a
//! table that lives only for the call, and nothing touches the disk.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::fetch::{Decoder, Fetcher};
use crate::freshness::{Freshness, FreshnessPolicy};
use crate::gaps::{covers_all, detect_gaps};
use crate::interval::TimeRange;
use crate::merge::{merge_chunk, FetchedChunk};
use crate::registry::DimensionRegistry;
use crate::storage::{
    migrate_if_needed, CacheLayout, IndicatorRef, IndicatorState, IndicatorStore,
    MigrationOutcome,
};
use crate::table::{ColumnKey, DimensionId, SeriesId, SeriesTable};

/// Which dimension values of each series to return.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DimensionFilter {
    /// Every dimension value the source reports.
    #[default]
    All,
    /// Only these dimension values.
    Only(Vec<DimensionId>),
}

/// What the last call to [`FetchOrchestrator::get`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub migrated: bool,
    pub freshness: Option<Freshness>,
    pub tasks: usize,
    /// Chunks fetched and merged successfully.
    pub chunks: usize,
    pub cells_written: usize,
}

/// Serves requests for one indicator from cache, fetching what is missing.
pub struct FetchOrchestrator {
    store: IndicatorStore,
    config: CacheConfig,
    policy: FreshnessPolicy,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder>,
    registry: DimensionRegistry,
    clock: Arc<dyn Clock>,
    last_report: Option<FetchReport>,
}

impl FetchOrchestrator {
    pub fn new(
        layout: &CacheLayout,
        indicator: IndicatorRef,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder>,
        registry: DimensionRegistry,
        config: CacheConfig,
    ) -> Self {
        Self {
            store: IndicatorStore::open(layout, indicator),
            policy: FreshnessPolicy::from_config(&config),
            config,
            fetcher,
            decoder,
            registry,
            clock: Arc::new(SystemClock),
            last_report: None,
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &IndicatorStore {
        &self.store
    }

    pub fn registry(&self) -> &DimensionRegistry {
        &self.registry
    }

    pub fn last_report(&self) -> Option<&FetchReport> {
        self.last_report.as_ref()
    }

    /// Return `series` over `range`, fetching whatever the cache cannot
    /// serve.
    ///
    /// Requested columns the source never reports come back as empty
    /// columns. Fetch and storage errors abort the call; chunks merged
    /// before the failure stay persisted. With the cache disabled the range
    /// is always fetched and nothing is persisted.
    pub fn get(
        &mut self,
        series: &[SeriesId],
        filter: &DimensionFilter,
        range: TimeRange,
    ) -> CacheResult<SeriesTable> {
        let mut report = FetchReport::default();
        let result = if self.config.enabled {
            self.serve(series, filter, range, &mut report)
        } else {
            self.serve_uncached(series, filter, range, &mut report)
        };
        let flushed = if self.config.enabled {
            self.registry.flush()
        } else {
            Ok(false)
        };
        self.last_report = Some(report);

        match (result, flushed) {
            (Ok(table), Ok(_)) => Ok(table),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(flush_err)) => {
                warn!(
                    path = %self.registry.path().display(),
                    error = %flush_err,
                    "Failed to flush dimension registry"
                );
                Err(e)
            }
        }
    }

    fn serve(
        &mut self,
        series: &[SeriesId],
        filter: &DimensionFilter,
        range: TimeRange,
        report: &mut FetchReport,
    ) -> CacheResult<SeriesTable> {
        let indicator = self.store.indicator().clone();

        report.migrated = matches!(
            migrate_if_needed(&self.store)?,
            MigrationOutcome::Migrated { .. }
        );
        let mut state = self.store.load()?;

        let now = self.clock.now();
        let requested = requested_columns(series, filter);
        let covered = covers_all(&range, &requested, &state.metadata.coverage);
        let freshness = self
            .policy
            .classify(now, range, covered, state.metadata.fetched_at);
        report.freshness = Some(freshness);

        if freshness.is_fresh() {
            debug!(indicator = %indicator, range = %range, "Serving from cache");
        } else {
            let tasks = detect_gaps(
                &range,
                &requested,
                &state.metadata.coverage,
                freshness.revalidate(),
                self.config.batching,
            );
            report.tasks = tasks.len();
            debug!(
                indicator = %indicator,
                range = %range,
                freshness = ?freshness,
                tasks = tasks.len(),
                "Cache needs fetching"
            );

            for task in &tasks {
                for chunk in task.range.split(self.config.chunk_width) {
                    report.cells_written += self.fetch_chunk(&mut state, &task.columns, chunk)?;
                    state.metadata.fetched_at = Some(now);
                    self.store.save(&state)?;
                    report.chunks += 1;
                }
            }

            if report.chunks > 0 {
                info!(
                    indicator = %indicator,
                    tasks = report.tasks,
                    chunks = report.chunks,
                    cells = report.cells_written,
                    "Fetched into cache"
                );
            }
        }

        let keys = output_columns(series, filter, &state.table);
        Ok(state.table.select(&keys, &range))
    }

    fn serve_uncached(
        &mut self,
        series: &[SeriesId],
        filter: &DimensionFilter,
        range: TimeRange,
        report: &mut FetchReport,
    ) -> CacheResult<SeriesTable> {
        let mut state = IndicatorState::default();
        let requested = requested_columns(series, filter);
        let tasks = detect_gaps(
            &range,
            &requested,
            &state.metadata.coverage,
            None,
            self.config.batching,
        );
        report.tasks = tasks.len();
        debug!(
            indicator = %self.store.indicator(),
            range = %range,
            tasks = tasks.len(),
            "Cache disabled, fetching from source"
        );

        for task in &tasks {
            for chunk in task.range.split(self.config.chunk_width) {
                report.cells_written += self.fetch_chunk(&mut state, &task.columns, chunk)?;
                report.chunks += 1;
            }
        }

        let keys = output_columns(series, filter, &state.table);
        Ok(state.table.select(&keys, &range))
    }

    /// Fetch, decode and merge one chunk. Nothing is merged unless both the
    /// fetch and the decode succeed.
    fn fetch_chunk(
        &mut self,
        state: &mut IndicatorState,
        columns: &[ColumnKey],
        range: TimeRange,
    ) -> CacheResult<usize> {
        debug!(
            indicator = %self.store.indicator(),
            range = %range,
            columns = columns.len(),
            "Fetching chunk"
        );
        let raw = self.fetcher.fetch(columns, &range)?;
        let observations = self.decoder.decode(&raw)?;

        let outcome = merge_chunk(
            &mut state.table,
            &mut state.metadata.coverage,
            FetchedChunk {
                range,
                columns: columns.to_vec(),
                observations,
            },
        );
        debug!(
            range = %range,
            columns = outcome.columns_replaced,
            cells = outcome.cells_written,
            "Merged chunk"
        );
        if outcome.out_of_range > 0 {
            debug!(
                range = %range,
                dropped = outcome.out_of_range,
                "Dropped observations outside the fetched range"
            );
        }
        for (id, name) in outcome.discovered {
            if self.registry.learn(id, name) {
                debug!(dimension = id, "Learned dimension name");
            }
        }
        Ok(outcome.cells_written)
    }
}

fn requested_columns(series: &[SeriesId], filter: &DimensionFilter) -> Vec<ColumnKey> {
    match filter {
        DimensionFilter::All => series.iter().map(|s| ColumnKey::series(*s)).collect(),
        DimensionFilter::Only(dimensions) => series
            .iter()
            .flat_map(|s| dimensions.iter().map(|d| ColumnKey::with_dimension(*s, *d)))
            .collect(),
    }
}

/// Columns to return: every cached column of each series for `All`, the
/// exact requested keys otherwise.
fn output_columns(
    series: &[SeriesId],
    filter: &DimensionFilter,
    table: &SeriesTable,
) -> Vec<ColumnKey> {
    match filter {
        DimensionFilter::All => series
            .iter()
            .flat_map(|s| {
                let columns = table.columns_of_series(*s);
                if columns.is_empty() {
                    vec![ColumnKey::series(*s)]
                } else {
                    columns
                }
            })
            .collect(),
        DimensionFilter::Only(_) => requested_columns(series, filter),
    }
}

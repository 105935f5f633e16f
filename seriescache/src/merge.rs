//! Merge engine: folds one fetched chunk into the cached table.
//!
//! Merging is by sub-range replacement, never by per-cell presence. For each
//! column the chunk is authoritative for, every cached cell inside the
//! chunk's range is dropped and replaced by what the source returned, so a
//! value the source has since withdrawn disappears instead of lingering.
//! The column's coverage then grows by the chunk's range, whether or not any
//! cell came back.
//!
//! A chunk is authoritative for the columns it was requested for. A
//! whole-series request is authoritative for every column of that series,
//! including dimension values the source returns for the first time.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::coverage::CoverageMap;
use crate::interval::{TimeRange, Timestamp};
use crate::table::{Cell, ColumnKey, DimensionId, Observation, SeriesTable};

/// Decoded result of one successful fetch call.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedChunk {
    /// The range the source was asked for.
    pub range: TimeRange,
    /// The columns the source was asked for.
    pub columns: Vec<ColumnKey>,
    pub observations: Vec<Observation>,
}

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub cells_written: usize,
    pub columns_replaced: usize,
    /// Observations outside the chunk's range, which are dropped.
    pub out_of_range: usize,
    /// `(dimension id, display name)` pairs seen in the chunk.
    pub discovered: Vec<(DimensionId, String)>,
}

/// Merge `chunk` into `table` and `coverage`.
///
/// Infallible: callers only merge chunks whose fetch and decode succeeded,
/// so a chunk is applied entirely or not at all.
pub fn merge_chunk(
    table: &mut SeriesTable,
    coverage: &mut CoverageMap,
    chunk: FetchedChunk,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    if chunk.range.is_empty() {
        return outcome;
    }

    let requested: BTreeSet<ColumnKey> = chunk.columns.iter().copied().collect();
    let whole_series: BTreeSet<u32> = requested
        .iter()
        .filter(|key| key.is_whole_series())
        .map(|key| key.series)
        .collect();
    let is_authoritative =
        |key: &ColumnKey| requested.contains(key) || whole_series.contains(&key.series);

    let mut incoming: BTreeMap<ColumnKey, Vec<(Timestamp, Cell)>> = BTreeMap::new();
    let mut names: BTreeMap<DimensionId, String> = BTreeMap::new();
    for observation in chunk.observations {
        if let (Some(dimension), Some(name)) =
            (observation.column.dimension, observation.dimension_name)
        {
            names.insert(dimension, name);
        }
        if !chunk.range.contains(&observation.timestamp) {
            outcome.out_of_range += 1;
            continue;
        }
        incoming
            .entry(observation.column)
            .or_default()
            .push((observation.timestamp, observation.cell));
    }
    outcome.discovered = names.into_iter().collect();

    // Columns whose cells inside the range are replaced wholesale.
    let mut replaced: BTreeSet<ColumnKey> = requested.clone();
    for series in &whole_series {
        replaced.extend(table.columns_of_series(*series));
        replaced.extend(coverage.columns_of_series(*series));
    }
    replaced.extend(incoming.keys().filter(|key| is_authoritative(key)).copied());

    for key in &replaced {
        let cells = incoming.remove(key).unwrap_or_default();
        outcome.cells_written += table.replace_range(*key, &chunk.range, cells);
        coverage.extend(*key, chunk.range);
    }
    outcome.columns_replaced = replaced.len();

    // Columns the source volunteered without being asked: keep the points,
    // claim no coverage.
    for (key, cells) in incoming {
        trace!(column = %key, cells = cells.len(), "Upserting unrequested column");
        for (ts, cell) in cells {
            table.insert(key, ts, cell);
            outcome.cells_written += 1;
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};

    fn day(d: u32) -> Timestamp {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, d, 0, 0, 0)
            .unwrap()
    }

    fn range(a: u32, b: u32) -> TimeRange {
        TimeRange::new(day(a), day(b))
    }

    fn hourly(column: ColumnKey, r: TimeRange, cell: impl Fn(i64) -> Cell) -> Vec<Observation> {
        let hours = r.duration().num_hours();
        (0..hours)
            .map(|h| Observation::new(r.start + Duration::hours(h), column, cell(h)))
            .collect()
    }

    const A: ColumnKey = ColumnKey {
        series: 1,
        dimension: None,
    };
    const B: ColumnKey = ColumnKey {
        series: 2,
        dimension: None,
    };

    #[test]
    fn test_values_and_absent_column_both_gain_coverage() {
        let mut table = SeriesTable::new();
        let mut coverage = CoverageMap::new();

        let mut observations = hourly(A, range(1, 3), |h| Cell::Value(h as f64));
        observations.extend(hourly(B, range(1, 3), |_| Cell::Absent));

        let outcome = merge_chunk(
            &mut table,
            &mut coverage,
            FetchedChunk {
                range: range(1, 3),
                columns: vec![A, B],
                observations,
            },
        );

        assert_eq!(outcome.cells_written, 96);
        assert_eq!(outcome.columns_replaced, 2);
        assert_eq!(coverage.get(&A).unwrap().intervals(), &[range(1, 3)]);
        assert_eq!(coverage.get(&B).unwrap().intervals(), &[range(1, 3)]);
        assert_eq!(table.get(&A, &day(2)), Some(Cell::Value(24.0)));
        // Marked absent, not missing.
        assert_eq!(table.get(&B, &day(2)), Some(Cell::Absent));
    }

    #[test]
    fn test_empty_response_still_covers_range() {
        let mut table = SeriesTable::new();
        let mut coverage = CoverageMap::new();

        merge_chunk(
            &mut table,
            &mut coverage,
            FetchedChunk {
                range: range(1, 3),
                columns: vec![A],
                observations: Vec::new(),
            },
        );

        assert!(coverage.effective(&A).contains(&range(1, 3)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_replacement_drops_withdrawn_values() {
        let mut table = SeriesTable::new();
        let mut coverage = CoverageMap::new();
        merge_chunk(
            &mut table,
            &mut coverage,
            FetchedChunk {
                range: range(1, 5),
                columns: vec![A],
                observations: hourly(A, range(1, 5), |_| Cell::Value(1.0)),
            },
        );

        // The source now returns only one corrected point for Jan 3..4.
        merge_chunk(
            &mut table,
            &mut coverage,
            FetchedChunk {
                range: range(3, 4),
                columns: vec![A],
                observations: vec![Observation::new(day(3), A, Cell::Value(7.0))],
            },
        );

        assert_eq!(table.get(&A, &day(3)), Some(Cell::Value(7.0)));
        assert_eq!(table.get(&A, &(day(3) + Duration::hours(1))), None);
        // Outside the chunk, previous data survives.
        assert_eq!(table.get(&A, &day(2)), Some(Cell::Value(1.0)));
        assert_eq!(table.get(&A, &day(4)), Some(Cell::Value(1.0)));
        assert_eq!(coverage.get(&A).unwrap().intervals(), &[range(1, 5)]);
    }

    #[test]
    fn test_untouched_columns_are_preserved() {
        let mut table = SeriesTable::new();
        let mut coverage = CoverageMap::new();
        table.insert(B, day(2), Cell::Value(5.0));
        coverage.extend(B, range(1, 3));

        merge_chunk(
            &mut table,
            &mut coverage,
            FetchedChunk {
                range: range(1, 3),
                columns: vec![A],
                observations: hourly(A, range(1, 3), |_| Cell::Value(1.0)),
            },
        );

        assert_eq!(table.get(&B, &day(2)), Some(Cell::Value(5.0)));
        assert_eq!(coverage.get(&B).unwrap().intervals(), &[range(1, 3)]);
    }

    #[test]
    fn test_whole_series_request_covers_discovered_dimensions() {
        let spain = ColumnKey::with_dimension(600, 3);
        let netherlands = ColumnKey::with_dimension(600, 8828);
        let mut table = SeriesTable::new();
        let mut coverage = CoverageMap::new();
        // A stale point for a dimension the source no longer reports.
        table.insert(netherlands, day(2), Cell::Value(9.0));

        let observations = vec![
            Observation::new(day(1), spain, Cell::Value(50.0)).with_dimension_name("España"),
            Observation::new(day(2), spain, Cell::Value(51.0)).with_dimension_name("España"),
        ];
        let outcome = merge_chunk(
            &mut table,
            &mut coverage,
            FetchedChunk {
                range: range(1, 3),
                columns: vec![ColumnKey::series(600)],
                observations,
            },
        );

        assert_eq!(outcome.discovered, vec![(3, "España".to_string())]);
        assert!(coverage.get(&spain).unwrap().contains(&range(1, 3)));
        assert!(coverage.get(&ColumnKey::series(600)).is_some());
        assert_eq!(table.get(&netherlands, &day(2)), None);
        assert_eq!(table.get(&spain, &day(2)), Some(Cell::Value(51.0)));
    }

    #[test]
    fn test_unrequested_column_gets_no_coverage() {
        let mut table = SeriesTable::new();
        let mut coverage = CoverageMap::new();

        merge_chunk(
            &mut table,
            &mut coverage,
            FetchedChunk {
                range: range(1, 3),
                columns: vec![A],
                observations: vec![Observation::new(day(1), B, Cell::Value(3.0))],
            },
        );

        assert_eq!(table.get(&B, &day(1)), Some(Cell::Value(3.0)));
        assert!(coverage.get(&B).is_none());
    }

    #[test]
    fn test_out_of_range_observations_dropped() {
        let mut table = SeriesTable::new();
        let mut coverage = CoverageMap::new();

        let outcome = merge_chunk(
            &mut table,
            &mut coverage,
            FetchedChunk {
                range: range(1, 3),
                columns: vec![A],
                observations: vec![
                    Observation::new(day(1), A, Cell::Value(1.0)),
                    Observation::new(day(3), A, Cell::Value(3.0)),
                ],
            },
        );

        assert_eq!(outcome.out_of_range, 1);
        assert_eq!(table.get(&A, &day(3)), None);
    }
}

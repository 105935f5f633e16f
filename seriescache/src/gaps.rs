//! Gap detection: which (columns, sub-range) pairs must be fetched.
//!
//! For each requested column the holes are the parts of the requested range
//! missing from its effective coverage, plus any forced revalidation range.
//! Columns whose holes are the same range are then batched into one task,
//! since a single call to the source returns several columns at once.

use std::collections::{BTreeMap, BTreeSet};

use crate::coverage::CoverageMap;
use crate::interval::{CoverageSet, TimeRange};
use crate::table::ColumnKey;

/// How columns sharing a gap are turned into fetch tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Batching {
    /// One task per distinct gap range, carrying every column that has it.
    #[default]
    Grouped,
    /// One task per column and gap range, for sources that cannot batch
    /// arbitrary column sets.
    PerColumn,
}

/// One unit of work for the fetch collaborator, before chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub columns: Vec<ColumnKey>,
    pub range: TimeRange,
}

/// True if every column's effective coverage contains `requested`.
pub fn covers_all(requested: &TimeRange, columns: &[ColumnKey], coverage: &CoverageMap) -> bool {
    columns
        .iter()
        .all(|column| coverage.effective(column).contains(requested))
}

/// Compute the fetch tasks needed to satisfy a request.
///
/// Every requested (column, instant) that is uncovered or inside
/// `revalidate` appears in exactly one task; nothing else does.
pub fn detect_gaps(
    requested: &TimeRange,
    columns: &[ColumnKey],
    coverage: &CoverageMap,
    revalidate: Option<TimeRange>,
    batching: Batching,
) -> Vec<FetchTask> {
    if requested.is_empty() {
        return Vec::new();
    }

    let forced = revalidate.and_then(|range| range.intersect(requested));
    let unique: BTreeSet<ColumnKey> = columns.iter().copied().collect();

    let mut by_range: BTreeMap<TimeRange, Vec<ColumnKey>> = BTreeMap::new();
    for column in unique {
        let mut holes = CoverageSet::from_ranges(coverage.effective(&column).missing(requested));
        if let Some(range) = forced {
            holes.insert(range);
        }
        for hole in holes.intervals() {
            by_range.entry(*hole).or_default().push(column);
        }
    }

    match batching {
        Batching::Grouped => by_range
            .into_iter()
            .map(|(range, columns)| FetchTask { columns, range })
            .collect(),
        Batching::PerColumn => by_range
            .into_iter()
            .flat_map(|(range, columns)| {
                columns.into_iter().map(move |column| FetchTask {
                    columns: vec![column],
                    range,
                })
            })
            .collect(),
    }
}

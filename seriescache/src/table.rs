//! Column-sparse, time-indexed series table.
//!
//! A table is a map from [`ColumnKey`] to that column's observed points.
//! Columns are independent: each one holds only the timestamps the source
//! actually reported for it, and an explicit [`Cell::Absent`] records "the
//! source was asked and returned nothing", which is different from a
//! timestamp that was never fetched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::interval::{TimeRange, Timestamp};

/// Identifier of a remote series (an indicator id).
pub type SeriesId = u32;

/// Identifier of a dimension value (a geography id).
pub type DimensionId = u32;

/// Key of one column: a series, optionally split by a dimension value.
///
/// A key without a dimension doubles as the "whole series" key when the
/// series is dimensioned: requesting it asks the source for every dimension
/// value at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    pub series: SeriesId,
    pub dimension: Option<DimensionId>,
}

impl ColumnKey {
    /// Key for a series without a dimension split.
    pub fn series(series: SeriesId) -> Self {
        Self {
            series,
            dimension: None,
        }
    }

    /// Key for one dimension value of a series.
    pub fn with_dimension(series: SeriesId, dimension: DimensionId) -> Self {
        Self {
            series,
            dimension: Some(dimension),
        }
    }

    pub fn is_whole_series(&self) -> bool {
        self.dimension.is_none()
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dimension {
            Some(dimension) => write!(f, "{}:{}", self.series, dimension),
            None => write!(f, "{}", self.series),
        }
    }
}

/// One cell: an observed value or an observed absence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Value(f64),
    Absent,
}

impl Cell {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Absent, Self::Value)
    }
}

/// One decoded record from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: Timestamp,
    pub column: ColumnKey,
    pub cell: Cell,
    /// Display name of the column's dimension, when the payload carries it.
    pub dimension_name: Option<String>,
}

impl Observation {
    pub fn new(timestamp: Timestamp, column: ColumnKey, cell: Cell) -> Self {
        Self {
            timestamp,
            column,
            cell,
            dimension_name: None,
        }
    }

    pub fn with_dimension_name(mut self, name: impl Into<String>) -> Self {
        self.dimension_name = Some(name.into());
        self
    }
}

/// Column-sparse table of observed points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable {
    columns: BTreeMap<ColumnKey, BTreeMap<Timestamp, Cell>>,
}

impl SeriesTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no column holds any cell.
    pub fn is_empty(&self) -> bool {
        self.columns.values().all(BTreeMap::is_empty)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn cell_count(&self) -> usize {
        self.columns.values().map(BTreeMap::len).sum()
    }

    pub fn column_keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.columns.keys()
    }

    pub fn has_column(&self, key: &ColumnKey) -> bool {
        self.columns.contains_key(key)
    }

    /// Cells of one column, in time order.
    pub fn column(&self, key: &ColumnKey) -> Option<&BTreeMap<Timestamp, Cell>> {
        self.columns.get(key)
    }

    pub fn get(&self, key: &ColumnKey, timestamp: &Timestamp) -> Option<Cell> {
        self.columns.get(key)?.get(timestamp).copied()
    }

    /// Columns of `series` currently in the table.
    pub fn columns_of_series(&self, series: SeriesId) -> Vec<ColumnKey> {
        self.columns
            .keys()
            .filter(|key| key.series == series)
            .copied()
            .collect()
    }

    /// Add (or create) an empty column.
    pub fn ensure_column(&mut self, key: ColumnKey) {
        self.columns.entry(key).or_default();
    }

    /// Insert one cell, overwriting any cell at the same timestamp.
    pub fn insert(&mut self, key: ColumnKey, timestamp: Timestamp, cell: Cell) {
        self.columns.entry(key).or_default().insert(timestamp, cell);
    }

    /// Replace every cell of `key` inside `range` with `cells`.
    ///
    /// Cells outside `range` are kept. Incoming cells outside `range` are
    /// ignored. Returns the number of cells written.
    pub fn replace_range<I>(&mut self, key: ColumnKey, range: &TimeRange, cells: I) -> usize
    where
        I: IntoIterator<Item = (Timestamp, Cell)>,
    {
        if range.is_empty() {
            return 0;
        }

        let mut written = 0;
        let column = self.columns.entry(key).or_default();
        let stale: Vec<Timestamp> = column
            .range(range.start..range.end)
            .map(|(ts, _)| *ts)
            .collect();
        for ts in stale {
            column.remove(&ts);
        }

        for (ts, cell) in cells {
            if range.contains(&ts) {
                column.insert(ts, cell);
                written += 1;
            }
        }

        if column.is_empty() {
            self.columns.remove(&key);
        }
        written
    }

    /// A new table holding exactly `keys`, restricted to `range`.
    ///
    /// Keys with no cells in range appear as empty columns.
    pub fn select(&self, keys: &[ColumnKey], range: &TimeRange) -> SeriesTable {
        let mut out = SeriesTable::new();
        for key in keys {
            out.ensure_column(*key);
            if range.is_empty() {
                continue;
            }
            if let Some(column) = self.columns.get(key) {
                for (ts, cell) in column.range(range.start..range.end) {
                    out.insert(*key, *ts, *cell);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn hour(h: u32) -> Timestamp {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_column_key_display() {
        assert_eq!(ColumnKey::series(600).to_string(), "600");
        assert_eq!(ColumnKey::with_dimension(600, 3).to_string(), "600:3");
    }

    #[test]
    fn test_cell_from_option() {
        assert_eq!(Cell::from(Some(1.5)), Cell::Value(1.5));
        assert_eq!(Cell::from(None), Cell::Absent);
        assert!(Cell::Absent.is_absent());
        assert_eq!(Cell::Value(0.0).value(), Some(0.0));
    }

    #[test]
    fn test_replace_range_keeps_outside_cells() {
        let key = ColumnKey::series(1);
        let mut table = SeriesTable::new();
        for h in 0..6 {
            table.insert(key, hour(h), Cell::Value(h as f64));
        }

        let written = table.replace_range(
            key,
            &TimeRange::new(hour(2), hour(4)),
            vec![(hour(3), Cell::Value(30.0)), (hour(5), Cell::Value(99.0))],
        );

        assert_eq!(written, 1);
        assert_eq!(table.get(&key, &hour(1)), Some(Cell::Value(1.0)));
        assert_eq!(table.get(&key, &hour(2)), None);
        assert_eq!(table.get(&key, &hour(3)), Some(Cell::Value(30.0)));
        // Outside the replaced range, untouched by the stray incoming cell.
        assert_eq!(table.get(&key, &hour(5)), Some(Cell::Value(5.0)));
    }

    #[test]
    fn test_replace_range_with_nothing_drops_empty_column() {
        let key = ColumnKey::series(1);
        let mut table = SeriesTable::new();
        table.insert(key, hour(1), Cell::Value(1.0));

        table.replace_range(key, &TimeRange::new(hour(0), hour(5)), Vec::new());

        assert!(!table.has_column(&key));
    }

    #[test]
    fn test_select_includes_unknown_columns_as_empty() {
        let known = ColumnKey::with_dimension(600, 3);
        let unknown = ColumnKey::with_dimension(600, 8828);
        let mut table = SeriesTable::new();
        table.insert(known, hour(1), Cell::Value(1.0));
        table.insert(known, hour(9), Cell::Value(9.0));

        let out = table.select(&[known, unknown], &TimeRange::new(hour(0), hour(5)));

        assert_eq!(out.column_count(), 2);
        assert_eq!(out.cell_count(), 1);
        assert!(out.column(&unknown).unwrap().is_empty());
    }

    #[test]
    fn test_columns_of_series() {
        let mut table = SeriesTable::new();
        table.insert(ColumnKey::series(1), hour(3), Cell::Value(1.0));
        table.insert(ColumnKey::with_dimension(2, 3), hour(1), Cell::Absent);
        table.insert(ColumnKey::series(2), hour(7), Cell::Value(2.0));

        assert_eq!(
            table.columns_of_series(2),
            vec![ColumnKey::series(2), ColumnKey::with_dimension(2, 3)]
        );
        assert!(table.columns_of_series(9).is_empty());
    }
}

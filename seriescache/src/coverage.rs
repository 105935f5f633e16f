//! Per-column coverage and the indicator metadata record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::interval::{CoverageSet, TimeRange, Timestamp};
use crate::table::{ColumnKey, SeriesId};

/// Current on-disk format version for table and metadata artifacts.
pub const FORMAT_VERSION: u32 = 2;

/// Coverage intervals for every column of one indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ColumnCoverage>", into = "Vec<ColumnCoverage>")]
pub struct CoverageMap {
    columns: BTreeMap<ColumnKey, CoverageSet>,
}

/// Serialized form of one column's coverage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnCoverage {
    series: SeriesId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dimension: Option<u32>,
    intervals: CoverageSet,
}

impl From<Vec<ColumnCoverage>> for CoverageMap {
    fn from(entries: Vec<ColumnCoverage>) -> Self {
        let mut map = CoverageMap::default();
        for entry in entries {
            let key = ColumnKey {
                series: entry.series,
                dimension: entry.dimension,
            };
            map.columns
                .entry(key)
                .or_default()
                .union_with(&entry.intervals);
        }
        map
    }
}

impl From<CoverageMap> for Vec<ColumnCoverage> {
    fn from(map: CoverageMap) -> Self {
        map.columns
            .into_iter()
            .map(|(key, intervals)| ColumnCoverage {
                series: key.series,
                dimension: key.dimension,
                intervals,
            })
            .collect()
    }
}

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.values().all(CoverageSet::is_empty)
    }

    pub fn column_keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.columns.keys()
    }

    /// Coverage recorded for exactly this key.
    pub fn get(&self, key: &ColumnKey) -> Option<&CoverageSet> {
        self.columns.get(key)
    }

    /// Coverage that applies to `key`.
    ///
    /// A dimensioned column is also covered wherever its whole series was
    /// fetched, since an unfiltered fetch returns every dimension value.
    pub fn effective(&self, key: &ColumnKey) -> CoverageSet {
        let mut set = self.columns.get(key).cloned().unwrap_or_default();
        if key.dimension.is_some() {
            if let Some(whole) = self.columns.get(&ColumnKey::series(key.series)) {
                set.union_with(whole);
            }
        }
        set
    }

    /// Record that `key` has been observed over `range`.
    pub fn extend(&mut self, key: ColumnKey, range: TimeRange) {
        if range.is_empty() {
            return;
        }
        self.columns.entry(key).or_default().insert(range);
    }

    /// Keys of `series` with recorded coverage.
    pub fn columns_of_series(&self, series: SeriesId) -> Vec<ColumnKey> {
        self.columns
            .keys()
            .filter(|key| key.series == series)
            .copied()
            .collect()
    }

    /// True if every column of `other` is covered at least as widely here.
    pub fn is_superset_of(&self, other: &CoverageMap) -> bool {
        other.columns.iter().all(|(key, theirs)| {
            self.columns
                .get(key)
                .is_some_and(|ours| ours.is_superset_of(theirs))
                || theirs.is_empty()
        })
    }
}

/// Metadata persisted next to each indicator's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageMetadata {
    pub format_version: u32,
    /// Wall-clock time of the last successful merge.
    pub fetched_at: Option<Timestamp>,
    pub coverage: CoverageMap,
}

impl Default for CoverageMetadata {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            fetched_at: None,
            coverage: CoverageMap::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn day(d: u32) -> Timestamp {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, d, 0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_effective_includes_whole_series() {
        let mut map = CoverageMap::new();
        map.extend(ColumnKey::series(600), TimeRange::new(day(1), day(5)));
        map.extend(
            ColumnKey::with_dimension(600, 3),
            TimeRange::new(day(5), day(8)),
        );

        let effective = map.effective(&ColumnKey::with_dimension(600, 3));
        assert!(effective.contains(&TimeRange::new(day(1), day(8))));

        // A never-seen dimension still inherits the whole-series coverage.
        let unseen = map.effective(&ColumnKey::with_dimension(600, 8828));
        assert!(unseen.contains(&TimeRange::new(day(1), day(5))));
        assert!(!unseen.contains(&TimeRange::new(day(1), day(6))));
    }

    #[test]
    fn test_whole_series_does_not_inherit_dimensions() {
        let mut map = CoverageMap::new();
        map.extend(
            ColumnKey::with_dimension(600, 3),
            TimeRange::new(day(1), day(5)),
        );
        assert!(map.effective(&ColumnKey::series(600)).is_empty());
    }

    #[test]
    fn test_metadata_json_shape() {
        let mut meta = CoverageMetadata::default();
        meta.fetched_at = Some(day(10));
        meta.coverage.extend(
            ColumnKey::with_dimension(600, 3),
            TimeRange::new(day(1), day(5)),
        );
        meta.coverage
            .extend(ColumnKey::series(10034), TimeRange::new(day(2), day(3)));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["format_version"], FORMAT_VERSION);
        assert_eq!(json["coverage"].as_array().unwrap().len(), 2);
        assert_eq!(json["coverage"][0]["dimension"], 3);
        assert!(json["coverage"][1].get("dimension").is_none());

        let back: CoverageMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_superset() {
        let mut before = CoverageMap::new();
        before.extend(ColumnKey::series(1), TimeRange::new(day(1), day(3)));

        let mut after = before.clone();
        after.extend(ColumnKey::series(1), TimeRange::new(day(3), day(6)));
        after.extend(ColumnKey::series(2), TimeRange::new(day(1), day(2)));

        assert!(after.is_superset_of(&before));
        assert!(!before.is_superset_of(&after));
    }
}

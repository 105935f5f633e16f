//! Half-open time ranges and coalesced interval sets.
//!
//! Every range in the cache is `[start, end)`. Half-open ranges make
//! adjacency exact: `[a, b)` and `[b, c)` coalesce into `[a, c)` with no
//! resolution-dependent fudge, and the complement of a set of ranges is again
//! a set of ranges of the same shape.

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

/// A fixed-offset instant in the source's local civil time.
///
/// Ordering and equality compare instants, so the same moment reported with
/// different offsets is the same key.
pub type Timestamp = DateTime<FixedOffset>;

/// Smallest step used when turning an observed closed span into a range.
pub fn resolution() -> Duration {
    Duration::seconds(1)
}

/// A half-open time range `[start, end)`.
///
/// A range whose `start` is not before its `end` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a range. No validation: `start >= end` yields an empty range.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// The smallest range containing the closed span `[first, last]`.
    pub fn covering(first: Timestamp, last: Timestamp) -> Self {
        Self::new(first, last + resolution())
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Length of the range; zero when empty.
    pub fn duration(&self) -> Duration {
        if self.is_empty() {
            Duration::zero()
        } else {
            self.end - self.start
        }
    }

    pub fn contains(&self, ts: &Timestamp) -> bool {
        self.start <= *ts && *ts < self.end
    }

    /// True if `other` lies entirely inside this range. Empty ranges are
    /// contained everywhere.
    pub fn contains_range(&self, other: &TimeRange) -> bool {
        other.is_empty() || (self.start <= other.start && other.end <= self.end)
    }

    /// Overlap of two ranges, `None` if they do not overlap.
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let range = TimeRange::new(self.start.max(other.start), self.end.min(other.end));
        (!range.is_empty()).then_some(range)
    }

    /// The trailing part of this range at or after `from`.
    pub fn trailing_from(&self, from: Timestamp) -> Option<TimeRange> {
        let range = TimeRange::new(self.start.max(from), self.end);
        (!range.is_empty()).then_some(range)
    }

    /// Split into consecutive sub-ranges no wider than `width`.
    ///
    /// A non-positive width yields the range unsplit.
    pub fn split(&self, width: Duration) -> Vec<TimeRange> {
        if self.is_empty() {
            return Vec::new();
        }
        if width <= Duration::zero() {
            return vec![*self];
        }

        let mut chunks = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let chunk_end = (cursor + width).min(self.end);
            chunks.push(TimeRange::new(cursor, chunk_end));
            cursor = chunk_end;
        }
        chunks
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// A set of time ranges kept sorted, disjoint and non-adjacent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageSet {
    intervals: Vec<TimeRange>,
}

impl CoverageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary (possibly overlapping) ranges.
    pub fn from_ranges<I: IntoIterator<Item = TimeRange>>(ranges: I) -> Self {
        let mut set = Self::new();
        for range in ranges {
            set.insert(range);
        }
        set
    }

    pub fn intervals(&self) -> &[TimeRange] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Add a range, coalescing with any overlapping or adjacent intervals.
    pub fn insert(&mut self, range: TimeRange) {
        if range.is_empty() {
            return;
        }

        let mut merged = range;
        let mut placed = false;
        let mut out = Vec::with_capacity(self.intervals.len() + 1);

        for interval in self.intervals.drain(..) {
            if interval.end < merged.start {
                out.push(interval);
            } else if merged.end < interval.start {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(interval);
            } else {
                merged = TimeRange::new(
                    merged.start.min(interval.start),
                    merged.end.max(interval.end),
                );
            }
        }

        if !placed {
            out.push(merged);
        }
        self.intervals = out;
    }

    /// Add every interval of `other`.
    pub fn union_with(&mut self, other: &CoverageSet) {
        for range in &other.intervals {
            self.insert(*range);
        }
    }

    /// The parts of `range` not covered by this set, in order.
    pub fn missing(&self, range: &TimeRange) -> Vec<TimeRange> {
        let mut gaps = Vec::new();
        if range.is_empty() {
            return gaps;
        }

        let mut cursor = range.start;
        for interval in &self.intervals {
            if interval.end <= cursor {
                continue;
            }
            if interval.start >= range.end {
                break;
            }
            if interval.start > cursor {
                gaps.push(TimeRange::new(cursor, interval.start));
            }
            cursor = cursor.max(interval.end);
            if cursor >= range.end {
                break;
            }
        }

        if cursor < range.end {
            gaps.push(TimeRange::new(cursor, range.end));
        }
        gaps
    }

    /// True if `range` is entirely covered.
    pub fn contains(&self, range: &TimeRange) -> bool {
        self.missing(range).is_empty()
    }

    /// True if every interval of `other` is covered by this set.
    pub fn is_superset_of(&self, other: &CoverageSet) -> bool {
        other.intervals.iter().all(|range| self.contains(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> Timestamp {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, d, 0, 0, 0)
            .unwrap()
    }

    fn range(a: u32, b: u32) -> TimeRange {
        TimeRange::new(day(a), day(b))
    }

    #[test]
    fn test_empty_range() {
        assert!(range(5, 5).is_empty());
        assert!(range(6, 5).is_empty());
        assert!(!range(5, 6).is_empty());
        assert_eq!(range(6, 5).duration(), Duration::zero());
    }

    #[test]
    fn test_intersect() {
        assert_eq!(range(1, 10).intersect(&range(5, 15)), Some(range(5, 10)));
        assert_eq!(range(1, 5).intersect(&range(5, 10)), None);
    }

    #[test]
    fn test_contains_is_half_open() {
        let r = range(1, 3);
        assert!(r.contains(&day(1)));
        assert!(r.contains(&day(2)));
        assert!(!r.contains(&day(3)));
    }

    #[test]
    fn test_same_instant_different_offset_is_equal() {
        let utc = day(2).with_timezone(&FixedOffset::east_opt(0).unwrap());
        assert_eq!(utc, day(2));
    }

    #[test]
    fn test_split_into_chunks() {
        let chunks = range(1, 30).split(Duration::days(10));
        assert_eq!(chunks, vec![range(1, 11), range(11, 21), range(21, 30)]);
    }

    #[test]
    fn test_split_exact_multiple() {
        let chunks = range(1, 22).split(Duration::days(7));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], range(15, 22));
    }

    #[test]
    fn test_trailing_from() {
        assert_eq!(range(1, 10).trailing_from(day(8)), Some(range(8, 10)));
        assert_eq!(range(5, 10).trailing_from(day(1)), Some(range(5, 10)));
        assert_eq!(range(1, 10).trailing_from(day(10)), None);
    }

    #[test]
    fn test_covering_closed_span() {
        let r = TimeRange::covering(day(1), day(3));
        assert!(r.contains(&day(3)));
        assert_eq!(r.end, day(3) + resolution());
    }

    #[test]
    fn test_insert_coalesces_adjacent() {
        let set = CoverageSet::from_ranges([range(1, 3), range(3, 5)]);
        assert_eq!(set.intervals(), &[range(1, 5)]);
    }

    #[test]
    fn test_insert_keeps_disjoint_sorted() {
        let set = CoverageSet::from_ranges([range(10, 12), range(1, 3), range(5, 6)]);
        assert_eq!(set.intervals(), &[range(1, 3), range(5, 6), range(10, 12)]);
    }

    #[test]
    fn test_insert_bridges_several() {
        let set = CoverageSet::from_ranges([range(1, 3), range(5, 6), range(8, 9), range(2, 8)]);
        assert_eq!(set.intervals(), &[range(1, 9)]);
    }

    #[test]
    fn test_missing_within_range() {
        let set = CoverageSet::from_ranges([range(1, 10)]);
        assert_eq!(set.missing(&range(5, 15)), vec![range(10, 15)]);
        assert!(set.missing(&range(2, 9)).is_empty());
    }

    #[test]
    fn test_missing_interior_holes() {
        let set = CoverageSet::from_ranges([range(3, 5), range(7, 9)]);
        assert_eq!(
            set.missing(&range(1, 12)),
            vec![range(1, 3), range(5, 7), range(9, 12)]
        );
    }

    #[test]
    fn test_missing_on_empty_set() {
        let set = CoverageSet::new();
        assert_eq!(set.missing(&range(1, 4)), vec![range(1, 4)]);
        assert!(set.missing(&range(4, 4)).is_empty());
    }

    #[test]
    fn test_superset() {
        let big = CoverageSet::from_ranges([range(1, 10)]);
        let small = CoverageSet::from_ranges([range(2, 3), range(5, 9)]);
        assert!(big.is_superset_of(&small));
        assert!(!small.is_superset_of(&big));
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn hour(h: i64) -> Timestamp {
            day(1) + Duration::hours(h)
        }

        fn ranges_strategy() -> impl Strategy<Value = Vec<(i64, i64)>> {
            prop::collection::vec((0i64..200, 0i64..48), 0..20)
        }

        proptest! {
            #[test]
            fn test_intervals_stay_sorted_and_disjoint(spans in ranges_strategy()) {
                let set = CoverageSet::from_ranges(
                    spans.iter().map(|(s, len)| TimeRange::new(hour(*s), hour(s + len))),
                );

                for pair in set.intervals().windows(2) {
                    prop_assert!(
                        pair[0].end < pair[1].start,
                        "intervals {} and {} overlap or touch",
                        pair[0], pair[1]
                    );
                }
                for interval in set.intervals() {
                    prop_assert!(!interval.is_empty());
                }
            }

            #[test]
            fn test_every_inserted_range_is_covered(spans in ranges_strategy()) {
                let ranges: Vec<TimeRange> = spans
                    .iter()
                    .map(|(s, len)| TimeRange::new(hour(*s), hour(s + len)))
                    .collect();
                let set = CoverageSet::from_ranges(ranges.iter().copied());

                for range in &ranges {
                    prop_assert!(set.contains(range), "{} not covered", range);
                }
            }

            #[test]
            fn test_missing_is_disjoint_from_coverage(
                spans in ranges_strategy(),
                query_start in 0i64..250,
                query_len in 0i64..100,
            ) {
                let set = CoverageSet::from_ranges(
                    spans.iter().map(|(s, len)| TimeRange::new(hour(*s), hour(s + len))),
                );
                let query = TimeRange::new(hour(query_start), hour(query_start + query_len));
                let gaps = set.missing(&query);

                for gap in &gaps {
                    prop_assert!(query.contains_range(gap));
                    for interval in set.intervals() {
                        prop_assert!(gap.intersect(interval).is_none());
                    }
                }

                // Coverage plus gaps reconstitutes the query.
                let mut filled = set.clone();
                for gap in gaps {
                    filled.insert(gap);
                }
                prop_assert!(filled.contains(&query));
            }
        }
    }
}

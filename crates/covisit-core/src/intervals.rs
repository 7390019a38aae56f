//! Time-interval subtraction.
//!
//! Given a candidate interval and a set of previously-covered intervals,
//! computes the sub-intervals of the candidate that are not covered by any
//! of them. Used by the reporting path to avoid uploading the same venue
//! window twice when selected check-ins overlap.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A closed time interval with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Build an interval; swaps the endpoints if they arrive reversed.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the two intervals share a window of non-zero length.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The shared window of non-zero length, if any. Intervals that merely
    /// touch at an endpoint do not intersect.
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Interval { start, end })
        } else {
            None
        }
    }
}

/// Returns the parts of `candidate` not covered by any interval in
/// `covering`.
///
/// `covering` need not be sorted or disjoint. Each non-empty intersection
/// with the candidate is punched out of the working result list in turn: a
/// working interval that straddles the intersection splits in two, one whose
/// boundary coincides with the intersection shrinks to the single remainder.
/// Zero-duration pieces are dropped. Output order is unspecified.
pub fn subtract(candidate: Interval, covering: &[Interval]) -> Vec<Interval> {
    let mut sorted = covering.to_vec();
    sorted.sort_by_key(|iv| (iv.start, iv.end));

    let intersections: Vec<Interval> = sorted
        .iter()
        .filter_map(|iv| iv.intersection(&candidate))
        .collect();

    let mut intervals = vec![candidate];

    for cut in intersections {
        let mut next = Vec::with_capacity(intervals.len() + 1);
        for interval in intervals {
            match interval.intersection(&cut) {
                None => next.push(interval),
                Some(hit) => {
                    // Keep the remainder on each side of the punched-out
                    // window; either side may be empty.
                    if interval.start < hit.start {
                        next.push(Interval { start: interval.start, end: hit.start });
                    }
                    if hit.end < interval.end {
                        next.push(Interval { start: hit.end, end: interval.end });
                    }
                }
            }
        }
        intervals = next;
    }

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minutes * 60, 0).unwrap()
    }

    fn iv(start_min: i64, end_min: i64) -> Interval {
        Interval::new(at(start_min), at(end_min))
    }

    #[test]
    fn gap_between_covered_ranges_survives() {
        let covering = vec![iv(0, 10), iv(15, 20), iv(20, 30)];
        let result = subtract(iv(5, 25), &covering);
        assert_eq!(result, vec![iv(10, 15)]);
    }

    #[test]
    fn tail_past_last_covered_range_survives() {
        let covering = vec![iv(0, 10), iv(15, 20), iv(20, 30)];
        let result = subtract(iv(5, 35), &covering);
        assert_eq!(result, vec![iv(10, 15), iv(30, 35)]);
    }

    #[test]
    fn fully_covered_candidate_yields_nothing() {
        let covering = vec![iv(0, 35)];
        assert!(subtract(iv(5, 25), &covering).is_empty());
    }

    #[test]
    fn empty_covering_returns_candidate() {
        assert_eq!(subtract(iv(5, 25), &[]), vec![iv(5, 25)]);
    }

    #[test]
    fn touching_boundary_produces_no_artifacts() {
        // Covered range ends exactly where the candidate starts.
        let result = subtract(iv(10, 20), &[iv(0, 10)]);
        assert_eq!(result, vec![iv(10, 20)]);
    }

    #[test]
    fn covered_suffix_leaves_prefix() {
        let result = subtract(iv(0, 10), &[iv(5, 10)]);
        assert_eq!(result, vec![iv(0, 5)]);
    }

    #[test]
    fn overlapping_covers_compose() {
        // Second cover swallows a piece the first cover left behind.
        let result = subtract(iv(0, 50), &[iv(10, 20), iv(15, 40)]);
        assert_eq!(result, vec![iv(0, 10), iv(40, 50)]);
    }

    #[test]
    fn covered_prefix_leaves_suffix() {
        let result = subtract(iv(10, 12 * 60), &[iv(10, 30)]);
        assert_eq!(result, vec![iv(30, 12 * 60)]);
    }

    fn covered_seconds_within(candidate: Interval, covering: &[Interval]) -> i64 {
        // Sweep over merged intersections to count covered seconds exactly once.
        let mut cuts: Vec<Interval> = covering
            .iter()
            .filter_map(|iv| iv.intersection(&candidate))
            .collect();
        cuts.sort_by_key(|iv| (iv.start, iv.end));
        let mut total = 0;
        let mut high: Option<DateTime<Utc>> = None;
        for cut in cuts {
            let start = match high {
                Some(h) if cut.start < h => h,
                _ => cut.start,
            };
            if start < cut.end {
                total += (cut.end - start).num_seconds();
                high = Some(cut.end);
            }
        }
        total
    }

    proptest! {
        // Remainder pieces plus the covered portion reconstruct the
        // candidate exactly, and no two pieces overlap.
        #[test]
        fn subtraction_is_complete_and_disjoint(
            start in 0i64..500,
            len in 1i64..500,
            raw in prop::collection::vec((0i64..600, 1i64..200), 0..8),
        ) {
            let candidate = iv(start, start + len);
            let covering: Vec<Interval> =
                raw.into_iter().map(|(s, l)| iv(s, s + l)).collect();

            let result = subtract(candidate, &covering);

            for piece in &result {
                prop_assert!(piece.start >= candidate.start);
                prop_assert!(piece.end <= candidate.end);
                prop_assert!(!piece.is_empty());
                for cover in &covering {
                    prop_assert!(!piece.overlaps(cover));
                }
            }
            for (i, a) in result.iter().enumerate() {
                for b in result.iter().skip(i + 1) {
                    prop_assert!(!a.overlaps(b));
                }
            }

            let remainder: i64 = result.iter().map(|p| p.duration().num_seconds()).sum();
            let covered = covered_seconds_within(candidate, &covering);
            prop_assert_eq!(remainder + covered, candidate.duration().num_seconds());
        }
    }
}

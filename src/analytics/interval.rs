// src/analytics/interval.rs

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Half-open span of zoned instants `[start, end)`.
///
/// An interval with `end <= start` is degenerate: it is empty and covers
/// zero minutes. Construction never fails so malformed upstream windows
/// (e.g. a block whose end time precedes its start time) flow through the
/// algebra as zero capacity instead of aborting a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeInterval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeInterval {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whole minutes covered, floored. Zero for degenerate intervals.
    #[inline]
    pub fn minutes(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_minutes()
        }
    }

    /// Intersection with `window`. Disjoint inputs yield an empty interval
    /// anchored at the later start.
    pub fn clip(&self, window: &TimeInterval) -> TimeInterval {
        let start = self.start.max(window.start);
        let end = self.end.min(window.end);
        if end <= start {
            TimeInterval { start, end: start }
        } else {
            TimeInterval { start, end }
        }
    }
}

/// Folds an unordered collection into the minimal disjoint covering set,
/// ordered by start. Touching intervals (`next.start == current.end`) are
/// joined; empty intervals are dropped.
pub fn merge<I>(intervals: I) -> Vec<TimeInterval>
where
    I: IntoIterator<Item = TimeInterval>,
{
    let mut sorted: Vec<TimeInterval> = intervals.into_iter().filter(|iv| !iv.is_empty()).collect();
    sorted.sort_by_key(|iv| (iv.start, iv.end));

    let mut merged: Vec<TimeInterval> = Vec::with_capacity(sorted.len());
    for iv in sorted {
        match merged.last_mut() {
            Some(last) if iv.start <= last.end => {
                if iv.end > last.end {
                    last.end = iv.end;
                }
            }
            _ => merged.push(iv),
        }
    }
    merged
}

/// Sum of whole minutes across a merged set.
pub fn covered_minutes(merged: &[TimeInterval]) -> i64 {
    merged.iter().map(TimeInterval::minutes).sum()
}

/// Whether any two intervals overlap once sorted by start. Intervals that
/// merely touch do not count.
pub fn has_overlap(intervals: &[TimeInterval]) -> bool {
    let mut sorted: Vec<&TimeInterval> = intervals.iter().collect();
    sorted.sort_by_key(|iv| (iv.start, iv.end));
    sorted.windows(2).any(|pair| pair[1].start < pair[0].end)
}

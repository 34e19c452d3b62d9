//! Occupancy time windows.
//!
//! # Time Model
//! All times are in milliseconds since the Unix epoch. Windows are
//! half-open: a train leaving a section at `t` and the next one entering
//! at `t` do not overlap (their gap is zero).

use serde::{Deserialize, Serialize};

/// Milliseconds per minute.
pub const MINUTE_MS: i64 = 60_000;

/// A time interval [start, end).
///
/// Half-open interval: includes start, excludes end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// Interval start (ms, inclusive).
    pub start_ms: i64,
    /// Interval end (ms, exclusive).
    pub end_ms: i64,
}

impl TimeWindow {
    /// Creates a new time window.
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Creates a window from a start time and a length in minutes.
    pub fn from_minutes(start_ms: i64, minutes: i64) -> Self {
        Self::new(start_ms, start_ms + minutes * MINUTE_MS)
    }

    /// Duration of this window (ms).
    #[inline]
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Whether a timestamp falls within this window.
    #[inline]
    pub fn contains(&self, time_ms: i64) -> bool {
        time_ms >= self.start_ms && time_ms < self.end_ms
    }

    /// Whether two windows overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_ms < other.end_ms && other.start_ms < self.end_ms
    }

    /// Separation between two non-overlapping windows (ms).
    ///
    /// Returns `None` when the windows overlap.
    pub fn gap_to(&self, other: &Self) -> Option<i64> {
        if self.overlaps(other) {
            return None;
        }
        if self.end_ms <= other.start_ms {
            Some(other.start_ms - self.end_ms)
        } else {
            Some(self.start_ms - other.end_ms)
        }
    }

    /// The same window moved by `delta_ms`.
    pub fn shifted(&self, delta_ms: i64) -> Self {
        Self::new(self.start_ms + delta_ms, self.end_ms + delta_ms)
    }

    /// Smallest window covering both.
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.start_ms.min(other.start_ms),
            self.end_ms.max(other.end_ms),
        )
    }
}

/// Rounds a positive millisecond span up to whole minutes.
pub fn ceil_minutes(ms: i64) -> i64 {
    if ms <= 0 {
        return 0;
    }
    (ms + MINUTE_MS - 1) / MINUTE_MS
}

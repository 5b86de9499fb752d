//! Time range used to steer tree traversals

use tracegraph_core::Timestamp;

/// An inclusive time range.
///
/// Queries walk the tree with a range; nodes and child tables are pruned
/// when their covered span does not intersect it. Point-in-time lookups use
/// [`TimeRange::singleton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    min: Timestamp,
    max: Timestamp,
}

impl TimeRange {
    /// Create a range covering `[min, max]`.
    pub fn new(min: Timestamp, max: Timestamp) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }

    /// Create a range covering the single timestamp `ts`.
    pub fn singleton(ts: Timestamp) -> Self {
        Self { min: ts, max: ts }
    }

    /// Lower bound, inclusive.
    pub fn min(&self) -> Timestamp {
        self.min
    }

    /// Upper bound, inclusive.
    pub fn max(&self) -> Timestamp {
        self.max
    }

    /// Whether the span `[start, end]` intersects this range.
    pub fn intersects(&self, start: Timestamp, end: Timestamp) -> bool {
        start <= self.max && end >= self.min
    }
}

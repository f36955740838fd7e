//! Core type definitions for the replication buffer.

use std::fmt;

/// A monotonic logical offset into the binlog stream.
///
/// Logical positions are independent of the physical file backing the
/// stream: they increase strictly along the log and survive rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition(pub i64);

impl LogPosition {
    /// The position used by the rotation ring's tail sentinel.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates a new logical position.
    #[must_use]
    pub const fn new(pos: i64) -> Self {
        Self(pos)
    }

    /// Returns the raw offset value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns the position `n` bytes further along the stream.
    #[must_use]
    pub fn advance(self, n: u64) -> Self {
        Self(self.0 + n as i64)
    }

    /// Returns the byte distance from `earlier` to `self`.
    ///
    /// # Panics
    ///
    /// Panics if `earlier` is beyond `self`; positions only move forward.
    #[must_use]
    pub fn distance_from(self, earlier: Self) -> u64 {
        assert!(
            earlier.0 <= self.0,
            "position {earlier} is beyond {self}",
        );
        (self.0 - earlier.0) as u64
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos:{}", self.0)
    }
}

/// Progress reported by one pump cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpProgress {
    /// The writer delivered new bytes into the buffer.
    pub wrote: bool,
    /// The reader consumed bytes through the replay callback.
    pub read: bool,
}

impl PumpProgress {
    /// Returns `true` if either side made progress.
    #[must_use]
    pub fn any(self) -> bool {
        self.wrote || self.read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_ordering() {
        let p1 = LogPosition::new(10);
        let p2 = LogPosition::new(20);
        assert!(p1 < p2);
    }

    #[test]
    fn advance_and_distance() {
        let p = LogPosition::new(100);
        let q = p.advance(40);
        assert_eq!(q.as_i64(), 140);
        assert_eq!(q.distance_from(p), 40);
        assert_eq!(p.distance_from(p), 0);
    }

    #[test]
    #[should_panic(expected = "is beyond")]
    fn backward_distance_panics() {
        let p = LogPosition::new(100);
        LogPosition::new(50).distance_from(p);
    }

    #[test]
    fn position_display() {
        assert_eq!(format!("{}", LogPosition::new(42)), "pos:42");
    }

    #[test]
    fn progress_any() {
        assert!(!PumpProgress::default().any());
        assert!(PumpProgress { wrote: true, read: false }.any());
        assert!(PumpProgress { wrote: false, read: true }.any());
    }
}

//! Time base of the dispatchers

use core::fmt;

/// Point in time of a dispatcher, in the unit of its tick period
///
/// The counter is fixed-width and rolls over during long runtimes. All
/// comparisons go through the signed difference of two stamps, which is
/// correct as long as the compared points are less than half the range apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeStamp(pub u32);

impl TimeStamp {
    /// Start of every dispatcher's time line
    pub const ZERO: Self = Self(0);

    /// Largest time span a timer may be programmed with
    pub const MAX_SPAN: u32 = i32::MAX as u32;

    /// Create a time stamp from a raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw counter value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Advance by `span` time units, rolling over at the end of the range
    pub const fn wrapping_add(self, span: u32) -> Self {
        Self(self.0.wrapping_add(span))
    }

    /// Signed distance from `earlier` to `self`
    pub const fn diff(self, earlier: TimeStamp) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// True if `self` has been reached at time `now`
    pub const fn is_due(self, now: TimeStamp) -> bool {
        now.diff(self) >= 0
    }

    /// True if `self` lies strictly after `other`
    pub const fn is_after(self, other: TimeStamp) -> bool {
        self.diff(other) > 0
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TimeStamp {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "t={}", self.0);
    }
}

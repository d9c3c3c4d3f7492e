//! Millisecond control-clock timestamps.

/// A point on the 1 kHz control clock.
///
/// The counter wraps; compare timestamps only through [`Timestamp::since`],
/// which is wrap-safe for intervals shorter than ~49 days.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Timestamp(pub u32);

impl Timestamp {
    /// Create a timestamp from a millisecond count.
    pub const fn from_millis(ms: u32) -> Self {
        Self(ms)
    }

    /// Raw millisecond count.
    pub const fn millis(self) -> u32 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self`.
    pub const fn since(self, earlier: Timestamp) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// This timestamp moved forward by `ms`.
    pub const fn add_millis(self, ms: u32) -> Self {
        Self(self.0.wrapping_add(ms))
    }

    /// This timestamp moved back by `ms`.
    pub const fn sub_millis(self, ms: u32) -> Self {
        Self(self.0.wrapping_sub(ms))
    }
}

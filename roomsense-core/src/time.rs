//! Time for the scheduler
//!
//! The node only needs a monotonic millisecond counter since boot. Durations
//! are `fugit` millisecond durations so timer periods and timeouts carry
//! their unit in the type.

use fugit::MillisDurationU32;

use crate::constants::MS_PER_SECOND;

/// Milliseconds since boot
pub type Timestamp = u64;

/// Millisecond duration used for every period, delay and timeout
pub type Millis = MillisDurationU32;

/// Monotonic time source
///
/// Implementations wrap the board's RTC or low-power timer. `now` must never
/// go backwards; the timer set relies on that to compute expiries.
pub trait Clock {
    /// Milliseconds since boot
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Duration of `ms` milliseconds
pub const fn millis(ms: u32) -> Millis {
    Millis::from_ticks(ms)
}

/// Duration of `s` seconds
pub const fn secs(s: u32) -> Millis {
    Millis::from_ticks(s.saturating_mul(MS_PER_SECOND))
}

/// Timestamp `after` from `now`
pub fn deadline(now: Timestamp, after: Millis) -> Timestamp {
    now.saturating_add(u64::from(after.ticks()))
}

/// Milliseconds from `since` to `now`, zero if `now` is earlier
pub fn elapsed(since: Timestamp, now: Timestamp) -> u64 {
    now.saturating_sub(since)
}

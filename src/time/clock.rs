//! Monotonic clock used for every deadline computation.
//!
//! The clock is anchored at an `Instant` captured on construction. All
//! deadlines are stored as [`Time`] offsets from that anchor, which keeps
//! them small, `Copy`, and totally ordered, while wall-clock adjustments
//! cannot move them.

use crate::types::Time;
use std::time::{Duration, Instant};

#[inline]
fn duration_to_nanos_saturating(duration: Duration) -> u64 {
    duration.as_nanos().min(u128::from(u64::MAX)) as u64
}

/// Monotonic time source for one scheduler instance.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    /// Creates a clock whose epoch is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> Time {
        Time::from_nanos(duration_to_nanos_saturating(self.epoch.elapsed()))
    }

    /// Returns the deadline `delay` from now.
    #[must_use]
    pub fn deadline_after(&self, delay: Duration) -> Time {
        self.now() + delay
    }

    /// Converts a timestamp from this clock back into an `Instant`.
    ///
    /// Saturates to a far-future instant if the addition would overflow the
    /// platform representation.
    #[must_use]
    pub fn instant_of(&self, time: Time) -> Instant {
        let offset = Duration::from_nanos(time.as_nanos());
        self.epoch
            .checked_add(offset)
            .unwrap_or_else(|| self.epoch + Duration::from_secs(86_400 * 365 * 30))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

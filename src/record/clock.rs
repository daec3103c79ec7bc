//! Process-monotonic wall clock

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Instant;

/// Wall-clock timestamps that never go backwards within the process.
///
/// Anchored once at creation; later readings add monotonic elapsed time to
/// the anchor, so NTP adjustments cannot reorder records.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin_wall: DateTime<Utc>,
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin_wall: Utc::now(),
            origin: Instant::now(),
        }
    }

    /// Current timestamp
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::zero());
        self.origin_wall + elapsed
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

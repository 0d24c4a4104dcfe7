// SPDX-License-Identifier: Apache-2.0

//! Coarse wall-clock time for flow aging.
//!
//! The engine samples time once per batch at one-second granularity; that
//! is the only precision flow expiration needs. Tests drive a manual
//! clock through a shared handle instead of sleeping.

use crate::flow::Timestamp;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A coarse clock read once per batch.
#[derive(Debug, Clone)]
pub struct Clock(ClockSource);

#[derive(Debug, Clone)]
enum ClockSource {
    Wall,
    Manual(Arc<AtomicU64>),
}

impl Clock {
    /// The system wall clock, in whole seconds since the Unix epoch.
    #[must_use]
    pub fn wall() -> Clock {
        Clock(ClockSource::Wall)
    }

    /// A manually driven clock starting at `start`, with a handle to move
    /// it.
    #[must_use]
    pub fn manual(start: Timestamp) -> (Clock, ManualClock) {
        let cell = Arc::new(AtomicU64::new(start));
        (
            Clock(ClockSource::Manual(cell.clone())),
            ManualClock(cell),
        )
    }

    /// Sample the clock.
    pub(crate) fn now(&self) -> Timestamp {
        match &self.0 {
            ClockSource::Wall => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_secs()),
            ClockSource::Manual(cell) => cell.load(Ordering::Relaxed),
        }
    }
}

/// Handle that drives a manual [`Clock`].
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    /// Set the clock to an absolute value.
    pub fn set(&self, secs: Timestamp) {
        self.0.store(secs, Ordering::Relaxed);
    }

    /// Advance the clock by `secs`.
    pub fn advance(&self, secs: Timestamp) {
        self.0.fetch_add(secs, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::Clock;

    #[test]
    fn manual_clock_is_driven_by_its_handle() {
        let (clock, handle) = Clock::manual(0);
        assert_eq!(clock.now(), 0);
        handle.advance(3);
        assert_eq!(clock.now(), 3);
        handle.set(100);
        assert_eq!(clock.now(), 100);
    }

    #[test]
    fn wall_clock_is_monotonic_enough() {
        let clock = Clock::wall();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}

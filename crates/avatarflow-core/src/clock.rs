//! Frame clocks
//!
//! Every deadline in the controller (blink schedule, idle-return delay) is a
//! plain [`TimePoint`] compared against a clock sampled once per frame.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Time in seconds
pub type TimePoint = f64;

/// Monotonic time source sampled once per rendered frame
pub trait Clock: Send {
    /// Current time in seconds. Must never decrease between calls.
    fn now(&self) -> TimePoint;
}

/// Wall-clock backed [`Clock`], measured from construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> TimePoint {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually advanced [`Clock`]
///
/// Clones share the same time, so a test can keep one handle and give the
/// other to the controller.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Arc<Mutex<TimePoint>>,
}

impl ManualClock {
    /// Create a clock at the given time
    pub fn new(start: TimePoint) -> Self {
        Self {
            time: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward. Negative or non-finite steps are ignored.
    pub fn advance(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            *self.time.lock() += seconds;
        }
    }

    /// Jump to an absolute time, never backwards
    pub fn set(&self, time: TimePoint) {
        let mut current = self.time.lock();
        if time > *current {
            *current = time;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimePoint {
        *self.time.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1.0);
        let handle = clock.clone();

        handle.advance(0.5);
        assert_eq!(clock.now(), 1.5);
    }

    #[test]
    fn test_manual_clock_never_goes_back() {
        let clock = ManualClock::new(2.0);
        clock.set(1.0);
        clock.advance(-3.0);
        clock.advance(f64::NAN);
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn test_monotonic_clock_starts_near_zero() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        assert!(first >= 0.0 && first < 1.0);
        assert!(clock.now() >= first);
    }
}

#![forbid(unsafe_code)]

//! Time sources for cooperative scheduling.
//!
//! Production code reads wall-clock time; tests use a [`LabClock`] that only
//! moves when told to, making timer behavior fully reproducible.
//!
//! # Example
//!
//! ```
//! use patchkit_core::{Clock, LabClock};
//! use web_time::Duration;
//!
//! let lab = LabClock::new();
//! let clock = Clock::Lab(lab.clone());
//! let t0 = clock.now();
//! lab.advance(Duration::from_millis(250));
//! assert_eq!(clock.now() - t0, Duration::from_millis(250));
//! ```

use std::cell::Cell;
use std::rc::Rc;

use web_time::{Duration, Instant};

/// Where "now" comes from.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Real wall-clock time.
    #[default]
    Real,
    /// Deterministic lab clock for testing.
    Lab(LabClock),
}

impl Clock {
    /// Current time according to this clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(lab) => lab.now(),
        }
    }

    /// Wait until `deadline`. Returns at once if it has passed. A lab clock
    /// jumps to the deadline instead of blocking.
    pub fn sleep_until(&self, deadline: Instant) {
        match self {
            Self::Real => {
                let wait = deadline.saturating_duration_since(Instant::now());
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
            }
            Self::Lab(lab) => lab.advance_to(deadline),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self, Self::Lab(_))
    }
}

/// Test time for a single-threaded main loop. Moves only when told to.
///
/// Clones share the same offset, so a test can hold one handle while the
/// scheduler reads another.
#[derive(Debug, Clone)]
pub struct LabClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl LabClock {
    /// Start at offset zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move forward by `delta`, saturating at `Duration::MAX`.
    pub fn advance(&self, delta: Duration) {
        self.offset.set(self.offset.get().saturating_add(delta));
    }

    /// Move forward to `deadline`. Never moves backwards.
    pub fn advance_to(&self, deadline: Instant) {
        let target = deadline.saturating_duration_since(self.origin);
        if target > self.offset.get() {
            self.offset.set(target);
        }
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    /// Total time advanced so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lab_clock_advance_accumulates() {
        let clock = LabClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_millis(100));
        clock.advance(Duration::from_millis(200));
        assert_eq!(clock.now().duration_since(t0), Duration::from_millis(300));
        assert_eq!(clock.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn clones_share_time() {
        let a = LabClock::new();
        let b = a.clone();
        a.advance(Duration::from_secs(1));
        assert_eq!(b.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn lab_sleep_jumps_to_deadline() {
        let lab = LabClock::new();
        let clock = Clock::Lab(lab.clone());
        clock.sleep_until(lab.now() + Duration::from_secs(3600));
        assert_eq!(lab.elapsed(), Duration::from_secs(3600));
    }

    #[test]
    fn advance_to_never_rewinds() {
        let lab = LabClock::new();
        let start = lab.now();
        lab.advance(Duration::from_millis(500));
        lab.advance_to(start + Duration::from_millis(200));
        assert_eq!(lab.elapsed(), Duration::from_millis(500));
        lab.advance_to(start + Duration::from_millis(750));
        assert_eq!(lab.elapsed(), Duration::from_millis(750));
    }

    #[test]
    fn real_sleep_until_past_deadline_returns() {
        let clock = Clock::Real;
        let past = clock.now();
        clock.sleep_until(past);
        assert!(clock.now() >= past);
    }

    #[test]
    fn default_clock_is_real() {
        let clock = Clock::default();
        assert!(!clock.is_lab());
        let t0 = clock.now();
        assert!(clock.now() >= t0);
    }
}

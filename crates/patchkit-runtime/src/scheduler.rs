#![forbid(unsafe_code)]

//! Cooperative repeating-timer scheduler.
//!
//! The host owns the main loop and calls [`Scheduler::run_due`] (or
//! [`Scheduler::iterate`]) once per iteration. Due timers run synchronously
//! on that thread, earliest deadline first.
//!
//! # Invariants
//!
//! 1. A timer fires at most once per `run_due` call, however late it is.
//! 2. A timer is re-armed to `now + interval` before its callback runs, so
//!    a slow callback delays later ticks instead of bunching them.
//! 3. A timer cancelled by an earlier callback in the same pass does not
//!    fire.
//! 4. At most `max_dispatch_per_iteration` callbacks run per pass; the rest
//!    stay due for the next one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use patchkit_core::panic::describe_panic;
use patchkit_core::{Clock, LabClock};
use tracing::{debug, error, trace};
use web_time::{Duration, Instant};

use crate::config::SchedulerConfig;

/// Identifier of a scheduled timer, unique within its scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

struct Timer {
    id: TimerId,
    interval: Duration,
    next_due: Instant,
    callback: Rc<dyn Fn()>,
}

struct SchedulerInner {
    clock: Clock,
    config: SchedulerConfig,
    timers: RefCell<Vec<Timer>>,
    next_id: Cell<u64>,
}

/// Single-threaded timer queue.
///
/// Cloning creates a new handle to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("clock", &self.inner.clock)
            .field("config", &self.inner.config)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Scheduler on wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Clock::Real, SchedulerConfig::default())
    }

    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self::with_config(clock, SchedulerConfig::default())
    }

    #[must_use]
    pub fn with_config(clock: Clock, config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                clock,
                config,
                timers: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Scheduler driven by a lab clock; time moves only when the test says.
    #[must_use]
    pub fn lab(clock: &LabClock) -> Self {
        Self::with_clock(Clock::Lab(clock.clone()))
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Run `callback` every `interval`, first one `interval` from now.
    pub fn schedule_repeating(&self, interval: Duration, callback: impl Fn() + 'static) -> TimerId {
        let id = TimerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        let next_due = self.inner.clock.now() + interval;
        self.inner.timers.borrow_mut().push(Timer {
            id,
            interval,
            next_due,
            callback: Rc::new(callback),
        });
        debug!(
            message = "scheduler.schedule",
            timer = id.0,
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        );
        id
    }

    /// Cancel a timer. Returns `false` if it was not scheduled.
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut timers = self.inner.timers.borrow_mut();
        let before = timers.len();
        timers.retain(|t| t.id != id);
        let removed = timers.len() != before;
        if removed {
            debug!(message = "scheduler.cancel", timer = id.0);
        }
        removed
    }

    #[must_use]
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.inner.timers.borrow().iter().any(|t| t.id == id)
    }

    /// Number of scheduled timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Earliest deadline among scheduled timers.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.timers.borrow().iter().map(|t| t.next_due).min()
    }

    /// Run every timer that is due now. Returns how many callbacks ran.
    pub fn run_due(&self) -> usize {
        let now = self.inner.clock.now();
        let mut due: Vec<(Instant, TimerId)> = self
            .inner
            .timers
            .borrow()
            .iter()
            .filter(|t| t.next_due <= now)
            .map(|t| (t.next_due, t.id))
            .collect();
        due.sort_unstable();
        due.truncate(self.inner.config.max_dispatch_per_iteration);

        let mut dispatched = 0;
        for (_, id) in due {
            let callback = {
                let mut timers = self.inner.timers.borrow_mut();
                let Some(timer) = timers.iter_mut().find(|t| t.id == id) else {
                    continue;
                };
                timer.next_due = now + timer.interval;
                Rc::clone(&timer.callback)
            };
            dispatched += 1;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback())) {
                error!(
                    message = "scheduler.timer_panicked",
                    timer = id.0,
                    reason = %describe_panic(&*payload),
                );
            }
        }
        trace!(message = "scheduler.run_due", dispatched);
        dispatched
    }

    /// One main-loop iteration.
    ///
    /// With `may_block`, waits (or, on a lab clock, advances time) until the
    /// next deadline when nothing is due yet. Never blocks when no timer is
    /// scheduled.
    pub fn iterate(&self, may_block: bool) -> usize {
        if may_block {
            if let Some(deadline) = self.next_deadline() {
                self.inner.clock.sleep_until(deadline);
            }
        }
        self.run_due()
    }
}

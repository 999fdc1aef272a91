#![forbid(unsafe_code)]

//! Repeating callbacks on a [`Scheduler`], stoppable from a patch teardown.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;
use web_time::Duration;

use crate::error::PatchError;
use crate::patch::{PatchId, PatchManager, PatchOptions};
use crate::scheduler::{Scheduler, TimerId};

struct RunnerInner {
    scheduler: Scheduler,
    interval: Cell<Duration>,
    callback: Rc<dyn Fn()>,
    timer: Cell<Option<TimerId>>,
}

/// A callback run every `interval` while started.
///
/// Cloning creates a new handle to the same runner. Prefer
/// [`start_patched`](Self::start_patched) so the timer cannot outlive the
/// feature that started it.
#[derive(Clone)]
pub struct IntervalRunner {
    inner: Rc<RunnerInner>,
}

impl fmt::Debug for IntervalRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalRunner")
            .field("interval", &self.inner.interval.get())
            .field("timer", &self.inner.timer.get())
            .finish()
    }
}

impl IntervalRunner {
    /// Create a stopped runner.
    #[must_use]
    pub fn new(scheduler: &Scheduler, interval: Duration, callback: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(RunnerInner {
                scheduler: scheduler.clone(),
                interval: Cell::new(interval),
                callback: Rc::new(callback),
                timer: Cell::new(None),
            }),
        }
    }

    /// Start ticking. Does nothing if already running.
    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        let callback = Rc::clone(&self.inner.callback);
        let id = self
            .inner
            .scheduler
            .schedule_repeating(self.inner.interval.get(), move || callback());
        self.inner.timer.set(Some(id));
        debug!(message = "interval.start", timer = id.raw());
    }

    /// Stop ticking. Safe to call repeatedly or before `start`.
    pub fn stop(&self) {
        if let Some(id) = self.inner.timer.take() {
            self.inner.scheduler.cancel(id);
            debug!(message = "interval.stop", timer = id.raw());
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .get()
            .is_some_and(|id| self.inner.scheduler.is_scheduled(id))
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval.get()
    }

    /// Change the period. A running timer restarts with the new period.
    pub fn set_interval(&self, interval: Duration) {
        self.inner.interval.set(interval);
        if self.is_running() {
            self.stop();
            self.start();
        }
    }

    /// Start as a patch on `manager`; its teardown stops the runner.
    ///
    /// A runner that is already running is left alone and the recorded
    /// teardown does nothing, so whoever started it keeps control.
    ///
    /// # Errors
    ///
    /// [`PatchError::TearingDown`] if `manager` is destroying; the runner is
    /// not started in that case.
    pub fn start_patched(&self, manager: &PatchManager) -> Result<PatchId, PatchError> {
        let runner = self.clone();
        manager.patch_with(PatchOptions::new().with_label("interval"), || {
            let started_here = !self.is_running();
            self.start();
            move || {
                if started_here {
                    runner.stop();
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchkit_core::LabClock;

    fn runner(lab: &LabClock, ms: u64) -> (Scheduler, IntervalRunner, Rc<Cell<u32>>) {
        let scheduler = Scheduler::lab(lab);
        let hits = Rc::new(Cell::new(0));
        let hits_in = Rc::clone(&hits);
        let runner = IntervalRunner::new(&scheduler, Duration::from_millis(ms), move || {
            hits_in.set(hits_in.get() + 1);
        });
        (scheduler, runner, hits)
    }

    #[test]
    fn start_is_idempotent() {
        let lab = LabClock::new();
        let (scheduler, runner, hits) = runner(&lab, 10);
        runner.start();
        runner.start();
        assert_eq!(scheduler.pending(), 1);
        lab.advance(Duration::from_millis(10));
        scheduler.run_due();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn stop_before_start_and_twice() {
        let lab = LabClock::new();
        let (scheduler, runner, _) = runner(&lab, 10);
        runner.stop();
        runner.start();
        runner.stop();
        runner.stop();
        assert!(!runner.is_running());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn ticks_repeat_until_stopped() {
        let lab = LabClock::new();
        let (scheduler, runner, hits) = runner(&lab, 10);
        runner.start();
        for _ in 0..3 {
            lab.advance(Duration::from_millis(10));
            scheduler.run_due();
        }
        runner.stop();
        lab.advance(Duration::from_millis(10));
        scheduler.run_due();
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn set_interval_restarts_running_timer() {
        let lab = LabClock::new();
        let (scheduler, runner, hits) = runner(&lab, 100);
        runner.start();
        runner.set_interval(Duration::from_millis(20));
        assert_eq!(runner.interval(), Duration::from_millis(20));
        lab.advance(Duration::from_millis(20));
        scheduler.run_due();
        assert_eq!(hits.get(), 1);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn patched_runner_stops_on_destroy() {
        let lab = LabClock::new();
        let (scheduler, runner, hits) = runner(&lab, 10);
        let manager = PatchManager::new();
        runner.start_patched(&manager).expect("accepts");
        assert!(runner.is_running());
        manager.destroy().expect("clean");
        assert!(!runner.is_running());
        lab.advance(Duration::from_millis(50));
        scheduler.run_due();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn patch_on_running_runner_leaves_it_running() {
        let lab = LabClock::new();
        let (scheduler, runner, hits) = runner(&lab, 10);
        runner.start();
        let manager = PatchManager::new();
        runner.start_patched(&manager).expect("accepts");
        assert_eq!(scheduler.pending(), 1);
        manager.destroy().expect("clean");
        assert!(runner.is_running());
        lab.advance(Duration::from_millis(10));
        scheduler.run_due();
        assert_eq!(hits.get(), 1);
        runner.stop();
    }

    #[test]
    fn cancelled_by_scheduler_reports_not_running() {
        let lab = LabClock::new();
        let (scheduler, runner, _) = runner(&lab, 10);
        runner.start();
        let id = runner.inner.timer.get().expect("started");
        scheduler.cancel(id);
        assert!(!runner.is_running());
        runner.start();
        assert!(runner.is_running());
    }
}

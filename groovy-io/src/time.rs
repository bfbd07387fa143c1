//! Time sources for frame pacing
//!
//! All pacing arithmetic is done in nanoseconds on a monotonic timeline.
//! The engine takes its clock as a type parameter so the busy-wait loops
//! can run against [`ManualClock`] in tests.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic nanosecond time source
pub trait Clock {
    /// Nanoseconds since an arbitrary fixed origin
    fn now_ns(&self) -> u64;

    /// Nanoseconds elapsed since `earlier`, saturating at zero
    #[inline]
    fn elapsed_since(&self, earlier: u64) -> u64 {
        self.now_ns().saturating_sub(earlier)
    }
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
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
    #[inline]
    fn now_ns(&self) -> u64 {
        self.origin
            .elapsed()
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

/// Deterministic clock for tests
///
/// Clones share the same timeline. Every read returns the current value
/// and then advances it by `step` nanoseconds, so polling loops make
/// progress without real time passing. The step is at least 1 ns.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
    step: u64,
}

impl ManualClock {
    /// Clock that advances by `step` nanoseconds per read
    pub fn with_step(step: u64) -> Self {
        ManualClock {
            now: Rc::new(Cell::new(0)),
            step: step.max(1),
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Current time without advancing
    pub fn peek(&self) -> u64 {
        self.now.get()
    }

    pub fn advance(&self, ns: u64) {
        self.now.set(self.now.get() + ns);
    }

    pub fn advance_by(&self, duration: Duration) {
        self.advance(duration.as_nanos() as u64);
    }

    pub fn set(&self, ns: u64) {
        self.now.set(ns);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// Convert a duration to whole nanoseconds
pub fn duration_ns(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}

//! Real-time clocks used for deadlines and for keeping real time in step
//! with the simulated queue clock.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source that can also realize a delay.
pub trait Clock: Send + Sync {
    /// Elapsed time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Let `duration` of real time pass.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by `Instant` and `thread::sleep`.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// A clock that only moves when told to. `sleep` returns immediately after
/// advancing the clock, which makes timeouts deterministic in tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    slept: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Total time passed through `sleep`.
    pub fn total_slept(&self) -> Duration {
        *self.slept.lock()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        *self.slept.lock() += duration;
        self.advance(duration);
    }
}

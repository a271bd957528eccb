// src/clock/mod.rs

use std::fmt::Debug;
use std::time::Instant;

pub mod mock;

pub use mock::MockClock;

/// Time source used for delayed scheduling.
///
/// Wake times are expressed in microseconds on this clock. A wake time of `0`
/// means "immediate", so implementations must never report `0` as a current
/// time that a delayed task could be compared against meaningfully; the
/// provided clocks start at 1.
pub trait Clock: Send + Sync + Debug {
    fn now_micros(&self) -> u64;
}

/// Implementation backed by `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
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
    fn now_micros(&self) -> u64 {
        let elapsed = self.origin.elapsed().as_micros();
        u64::try_from(elapsed).unwrap_or(u64::MAX - 1) + 1
    }
}

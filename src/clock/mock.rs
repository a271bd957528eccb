// src/clock/mock.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::Clock;

/// Manually advanced clock for tests.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// give another to the scheduler.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let micros = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.now.fetch_add(micros, Ordering::AcqRel);
    }

    pub fn set_micros(&self, now: u64) {
        self.now.store(now.max(1), Ordering::Release);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

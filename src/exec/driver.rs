// src/exec/driver.rs

//! Async driver ticking a scheduler until it finishes or is cancelled.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::model::SchedulerSection;
use crate::sched::Scheduler;
use crate::types::ResultCode;

#[derive(Debug, Clone)]
pub struct DriveOptions {
    /// Interval between two `progress()` calls.
    pub tick: Duration,
    /// Cancel the scheduler once this much time has passed.
    pub cancel_after: Option<Duration>,
    /// Result handed to tasks completed by cancellation.
    pub cancel_code: ResultCode,
}

impl DriveOptions {
    pub fn from_section(section: &SchedulerSection) -> Self {
        Self {
            tick: Duration::from_millis(section.tick_ms.max(1)),
            cancel_after: section.cancel_after_ms.map(Duration::from_millis),
            cancel_code: section.cancel_code,
        }
    }
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self::from_section(&SchedulerSection::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOutcome {
    /// Aggregate scheduler result after completion.
    pub result: ResultCode,
    pub cancelled: bool,
    /// Number of `progress()` calls made.
    pub ticks: u64,
}

/// Call `progress()` every tick until the scheduler has nothing left, then
/// complete it. If `cancel_after` elapses first, cancel it instead.
///
/// The scheduler is finalized when this returns.
pub async fn drive(sched: &Scheduler, options: &DriveOptions) -> DriveOutcome {
    let mut interval = tokio::time::interval(options.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = options.cancel_after.map(|after| Instant::now() + after);
    let mut ticks = 0u64;

    info!(tick = ?options.tick, cancel_after = ?options.cancel_after, "driver started");

    loop {
        interval.tick().await;
        ticks += 1;
        sched.progress();

        if sched.check_complete() {
            debug!(ticks, "scheduler idle, completing");
            sched.complete(0, false);
            break;
        }

        let expired = deadline.is_some_and(|at| Instant::now() >= at);
        if expired {
            warn!(
                ticks,
                inflight = sched.inflight(),
                code = options.cancel_code,
                "deadline reached, cancelling scheduler"
            );
            sched.complete(options.cancel_code, true);
            break;
        }
    }

    let outcome = DriveOutcome {
        result: sched.result(),
        cancelled: sched.is_cancelling(),
        ticks,
    };
    info!(result = outcome.result, cancelled = outcome.cancelled, ticks, "driver finished");
    outcome
}

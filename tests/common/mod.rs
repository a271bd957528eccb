#![allow(dead_code)]

use std::sync::Arc;

use tasksched::{MockClock, Scheduler, SchedulerOptions, Task};
use tasksched_test_utils::recorder::Recorder;

pub use tasksched_test_utils::init_tracing;

/// Fresh scheduler with default options.
pub fn new_sched() -> Scheduler {
    init_tracing();
    Scheduler::init(None, None).expect("scheduler init")
}

/// Scheduler driven by a manually advanced clock.
pub fn sched_with_clock() -> (Scheduler, MockClock) {
    init_tracing();
    let clock = MockClock::new();
    let options = SchedulerOptions {
        clock: Arc::new(clock.clone()),
        ..SchedulerOptions::default()
    };
    let sched = Scheduler::init_with_options(options, None, None).expect("scheduler init");
    (sched, clock)
}

/// Task whose body records `name` and completes with `rc`.
pub fn completing_task(sched: &Scheduler, rec: &Recorder, name: &str, rc: i32) -> Task {
    Task::with_body(sched, rec.completing_body(name, rc)).expect("task create")
}

/// Task whose body only records `name`.
pub fn recording_task(sched: &Scheduler, rec: &Recorder, name: &str) -> Task {
    Task::with_body(sched, rec.recording_body(name)).expect("task create")
}

// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{DEFAULT_SCRATCH_CAPACITY, ResultCode};

/// Pipeline description as read from a TOML file, before validation.
///
/// ```toml
/// [scheduler]
/// tick_ms = 1
/// cancel_after_ms = 500
///
/// [task.fetch]
/// latency_ms = 20
///
/// [task.build]
/// after = ["fetch"]
/// retries = 2
///
/// [task.done]
/// after = ["build"]
/// barrier = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPipelineFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// All tasks from `[task.<name>]`, keyed by name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskSpec>,
}

/// Validated pipeline. Only obtainable through `TryFrom<RawPipelineFile>`.
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub scheduler: SchedulerSection,
    pub task: BTreeMap<String, TaskSpec>,
}

impl PipelineFile {
    pub(crate) fn new_unchecked(
        scheduler: SchedulerSection,
        task: BTreeMap<String, TaskSpec>,
    ) -> Self {
        Self { scheduler, task }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    /// Scratch bytes given to every task.
    #[serde(default = "default_scratch_capacity")]
    pub scratch_capacity: usize,

    /// Interval between two `progress()` calls of the runner.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Cancel the scheduler if it has not finished after this long.
    #[serde(default)]
    pub cancel_after_ms: Option<u64>,

    /// Result given to tasks completed by cancellation.
    #[serde(default = "default_cancel_code")]
    pub cancel_code: ResultCode,
}

fn default_scratch_capacity() -> usize {
    DEFAULT_SCRATCH_CAPACITY
}

fn default_tick_ms() -> u64 {
    1
}

fn default_cancel_code() -> ResultCode {
    -125
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            scratch_capacity: default_scratch_capacity(),
            tick_ms: default_tick_ms(),
            cancel_after_ms: None,
            cancel_code: default_cancel_code(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    /// Tasks that must complete before this one runs.
    #[serde(default)]
    pub after: Vec<String>,

    /// Result code the body completes with.
    #[serde(default)]
    pub result: ResultCode,

    /// Keep the task asleep this long after scheduling.
    #[serde(default)]
    pub delay_ms: u64,

    /// Complete asynchronously this long after the body starts; `0`
    /// completes inside the body.
    #[serde(default)]
    pub latency_ms: u64,

    /// Times the body re-arms its task through `reinit` before completing.
    #[serde(default)]
    pub retries: u32,

    /// No body: completes once all of `after` did.
    #[serde(default)]
    pub barrier: bool,

    /// Do not inherit failing results from `after`.
    #[serde(default)]
    pub no_propagate: bool,

    /// Run the body inside `schedule` when nothing blocks it.
    #[serde(default)]
    pub instant: bool,
}

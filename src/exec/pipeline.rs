// src/exec/pipeline.rs

//! Turn a validated [`PipelineFile`] into engine tasks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::clock::MonotonicClock;
use crate::config::model::{PipelineFile, TaskSpec};
use crate::config::validate::topological_order;
use crate::errors::{Result, SchedError};
use crate::sched::{Scheduler, SchedulerOptions};
use crate::task::{Task, TaskBody};
use crate::types::{ResultCode, TaskState};

/// Bytes of the embedded block used as the attempt counter.
const ATTEMPT_BYTES: usize = std::mem::size_of::<u32>();

#[derive(Debug)]
struct PipelineTask {
    name: String,
    task: Task,
    spec: TaskSpec,
}

/// A scheduler plus one engine task per `[task.<name>]`, in dependency order.
#[derive(Debug)]
pub struct Pipeline {
    sched: Scheduler,
    tasks: Vec<PipelineTask>,
}

impl Pipeline {
    /// Create the scheduler and its tasks, wiring `after` as dependencies.
    ///
    /// Asynchronous completions (`latency_ms`) are spawned on `handle`.
    pub fn build(cfg: &PipelineFile, handle: Handle) -> Result<Self> {
        let options = SchedulerOptions {
            scratch_capacity: cfg.scheduler.scratch_capacity,
            clock: Arc::new(MonotonicClock::new()),
        };
        let sched = Scheduler::init_with_options(options, None, None)?;

        let mut by_name: BTreeMap<String, Task> = BTreeMap::new();
        let mut tasks = Vec::with_capacity(cfg.task.len());

        for name in topological_order(cfg) {
            let spec = cfg.task.get(&name).cloned().ok_or_else(|| {
                SchedError::ConfigError(format!("task '{name}' missing from pipeline"))
            })?;

            let task = if spec.barrier {
                let task = Task::barrier(&sched)?;
                task.register_prep_callback(|t| {
                    t.complete(0);
                    0
                })?;
                task
            } else {
                let body = make_body(name.clone(), &spec, handle.clone());
                Task::create(Some(body), &sched, None)?
            };
            task.set_no_propagate(spec.no_propagate);

            for dep in spec.after.iter() {
                let dep_task = by_name.get(dep).ok_or_else(|| {
                    SchedError::ConfigError(format!(
                        "task '{name}' depends on '{dep}' which is not built yet"
                    ))
                })?;
                task.add_dependency(dep_task)?;
            }

            debug!(task = %name, id = %task.id(), deps = spec.after.len(), "pipeline task built");
            by_name.insert(name.clone(), task.clone());
            tasks.push(PipelineTask { name, task, spec });
        }

        Ok(Self { sched, tasks })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name).map(|t| &t.task)
    }

    /// Hand every task to the scheduler, dependencies first.
    pub fn schedule(&self) -> Result<()> {
        for entry in &self.tasks {
            let delay = Duration::from_millis(entry.spec.delay_ms);
            entry.task.schedule_with_delay(entry.spec.instant, delay)?;
        }
        info!(tasks = self.tasks.len(), "pipeline scheduled");
        Ok(())
    }

    /// Snapshot of every task's state, result and attempt count.
    pub fn report(&self) -> PipelineReport {
        let tasks = self
            .tasks
            .iter()
            .map(|entry| TaskReport {
                name: entry.name.clone(),
                state: entry.task.state(),
                result: entry.task.result(),
                attempts: attempts(&entry.task),
            })
            .collect();

        PipelineReport {
            result: self.sched.result(),
            cancelled: self.sched.is_cancelling(),
            tasks,
        }
    }
}

fn make_body(name: String, spec: &TaskSpec, handle: Handle) -> TaskBody {
    let result = spec.result;
    let retries = spec.retries;
    let latency = Duration::from_millis(spec.latency_ms);

    Arc::new(move |task: &Task| {
        let attempt = match bump_attempts(task) {
            Ok(n) => n,
            Err(err) => {
                warn!(task = %name, error = %err, "attempt counter unavailable");
                task.complete(result);
                return;
            }
        };
        debug!(task = %name, attempt, "body running");

        if latency.is_zero() {
            settle(task, &name, attempt, retries, result);
            return;
        }

        let task = task.clone();
        let name = name.clone();
        handle.spawn(async move {
            tokio::time::sleep(latency).await;
            settle(&task, &name, attempt, retries, result);
        });
    })
}

/// Finish one attempt: re-arm while retries remain, otherwise complete.
fn settle(task: &Task, name: &str, attempt: u32, retries: u32, result: ResultCode) {
    if attempt <= retries {
        match task.reinit() {
            Ok(()) => {
                debug!(task = %name, attempt, "re-armed for another attempt");
                return;
            }
            Err(err) => warn!(task = %name, error = %err, "re-arm failed, completing"),
        }
    }
    task.complete(result);
}

fn bump_attempts(task: &Task) -> Result<u32> {
    task.with_embedded(ATTEMPT_BYTES, |block| {
        let mut raw = [0u8; ATTEMPT_BYTES];
        raw.copy_from_slice(block);
        let next = u32::from_le_bytes(raw).saturating_add(1);
        block.copy_from_slice(&next.to_le_bytes());
        next
    })
}

/// How many times the task's body has run.
pub fn attempts(task: &Task) -> u32 {
    task.with_embedded(ATTEMPT_BYTES, |block| {
        let mut raw = [0u8; ATTEMPT_BYTES];
        raw.copy_from_slice(block);
        u32::from_le_bytes(raw)
    })
    .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub name: String,
    pub state: TaskState,
    pub result: ResultCode,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub result: ResultCode,
    pub cancelled: bool,
    pub tasks: Vec<TaskReport>,
}

impl PipelineReport {
    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "pipeline result = {}{}",
            self.result,
            if self.cancelled { " (cancelled)" } else { "" }
        )?;
        for t in &self.tasks {
            writeln!(
                f,
                "  - {:<16} {:<10} result={:<5} attempts={}",
                t.name, t.state, t.result, t.attempts
            )?;
        }
        Ok(())
    }
}

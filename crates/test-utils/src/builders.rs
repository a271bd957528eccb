use std::collections::BTreeMap;
use tasksched::config::{PipelineFile, RawPipelineFile, SchedulerSection, TaskSpec};
use tasksched::types::ResultCode;

/// Builder for `PipelineFile` to simplify test setup.
pub struct PipelineBuilder {
    config: RawPipelineFile,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: RawPipelineFile {
                scheduler: SchedulerSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskSpec) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn tick_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.tick_ms = ms;
        self
    }

    pub fn cancel_after_ms(mut self, ms: u64) -> Self {
        self.config.scheduler.cancel_after_ms = Some(ms);
        self
    }

    pub fn cancel_code(mut self, code: ResultCode) -> Self {
        self.config.scheduler.cancel_code = code;
        self
    }

    pub fn scratch_capacity(mut self, bytes: usize) -> Self {
        self.config.scheduler.scratch_capacity = bytes;
        self
    }

    /// The raw, unvalidated pipeline.
    pub fn raw(self) -> RawPipelineFile {
        self.config
    }

    pub fn build(self) -> PipelineFile {
        PipelineFile::try_from(self.config).expect("Failed to build valid pipeline from builder")
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    task: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskSpec::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn result(mut self, rc: ResultCode) -> Self {
        self.task.result = rc;
        self
    }

    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.task.delay_ms = ms;
        self
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.task.latency_ms = ms;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.task.retries = n;
        self
    }

    pub fn barrier(mut self) -> Self {
        self.task.barrier = true;
        self
    }

    pub fn no_propagate(mut self) -> Self {
        self.task.no_propagate = true;
        self
    }

    pub fn instant(mut self) -> Self {
        self.task.instant = true;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}

impl Default for TaskSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

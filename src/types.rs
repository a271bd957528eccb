// src/types.rs

//! Small shared types used by both the task and scheduler modules.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, caller-defined task result. `0` means success by convention.
pub type ResultCode = i32;

/// Opaque caller data attached to a task or scheduler.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Scratch capacity given to each task unless the scheduler is configured
/// otherwise.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 840;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Public view of a task's state, derived from its running/completed flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not yet started (or re-armed by `reinit`).
    Init,
    /// Body invoked (or body-less task placed on the running collection),
    /// not yet completed.
    Running,
    Completed,
}

impl TaskState {
    pub(crate) fn from_flags(running: bool, completed: bool) -> Self {
        if completed {
            TaskState::Completed
        } else if running {
            TaskState::Running
        } else {
            TaskState::Init
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Init => "init",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
        };
        f.pad(s)
    }
}

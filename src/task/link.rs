// src/task/link.rs

use crate::task::Task;

/// One "dependent waits on this task" edge.
///
/// Stored on the depended-upon task's wait-list. The link owns one engine
/// reference on the dependent, released once the edge has been processed.
#[derive(Debug)]
pub(crate) struct DependencyLink {
    dependent: Task,
}

impl DependencyLink {
    pub(crate) fn new(dependent: Task) -> Self {
        Self { dependent }
    }

    pub(crate) fn into_dependent(self) -> Task {
        self.dependent
    }
}

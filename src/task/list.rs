// src/task/list.rs

//! Caller-owned ordered task lists.
//!
//! A task can sit in at most one [`TaskList`] at a time, independently of
//! the scheduler collections it moves through.

use std::collections::VecDeque;

use tracing::warn;

use crate::errors::{Result, SchedError};
use crate::task::Task;
use crate::types::ResultCode;

#[derive(Debug, Default)]
pub struct TaskList {
    tasks: VecDeque<Task>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `task`. Fails if it already belongs to a list.
    pub fn push(&mut self, task: &Task) -> Result<()> {
        self.tasks.try_reserve(1)?;
        if !task.link_user_list() {
            return Err(SchedError::PermissionDenied(format!(
                "{} is already in a task list",
                task.id()
            )));
        }
        self.tasks.push_back(task.clone());
        Ok(())
    }

    pub fn first(&self) -> Option<&Task> {
        self.tasks.front()
    }

    /// Remove `task` from the list. Returns `false` if it was not a member.
    pub fn remove(&mut self, task: &Task) -> bool {
        let Some(pos) = self.tasks.iter().position(|t| t == task) else {
            return false;
        };
        if let Some(removed) = self.tasks.remove(pos) {
            removed.unlink_user_list();
        }
        true
    }

    fn pop_front(&mut self) -> Option<Task> {
        let task = self.tasks.pop_front()?;
        task.unlink_user_list();
        Some(task)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Empty the list, scheduling every member in order.
    ///
    /// All members are scheduled even if some fail; the first error is
    /// returned.
    pub fn schedule_all(&mut self, instant: bool) -> Result<()> {
        let mut first_err = None;
        while let Some(task) = self.pop_front() {
            if let Err(err) = task.schedule(instant) {
                warn!(task = %task.id(), error = %err, "failed to schedule list member");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Empty the list, completing every member with `rc` without running it.
    pub fn abort_all(&mut self, rc: ResultCode) {
        while let Some(task) = self.pop_front() {
            task.complete(rc);
        }
    }

    /// Make every member depend on `task`.
    pub fn depend_on(&self, task: &Task) -> Result<()> {
        for member in &self.tasks {
            member.add_dependency(task)?;
        }
        Ok(())
    }

    /// Call `f` on every member; returns the last non-zero result.
    pub fn traverse<F>(&self, mut f: F) -> ResultCode
    where
        F: FnMut(&Task) -> ResultCode,
    {
        let mut ret = 0;
        for task in &self.tasks {
            let rc = f(task);
            if rc != 0 {
                ret = rc;
            }
        }
        ret
    }
}

impl Drop for TaskList {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.unlink_user_list();
        }
    }
}

impl Task {
    /// Make this task depend on every member of `list`.
    pub fn depend_on_list(&self, list: &TaskList) -> Result<()> {
        for member in list.iter() {
            self.add_dependency(member)?;
        }
        Ok(())
    }
}

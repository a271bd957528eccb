//! Shared event log for asserting on callback and body ordering.

use std::sync::{Arc, Mutex};

use tasksched::task::Task;
use tasksched::types::ResultCode;

/// Cloneable, thread-safe list of event strings.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    /// Position of the first occurrence of `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == event)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Body that records `name` and completes its task with `rc`.
    pub fn completing_body(&self, name: &str, rc: ResultCode) -> impl Fn(&Task) + Send + Sync + 'static {
        let rec = self.clone();
        let name = name.to_string();
        move |task: &Task| {
            rec.record(name.clone());
            task.complete(rc);
        }
    }

    /// Body that only records `name`; the test completes the task later.
    pub fn recording_body(&self, name: &str) -> impl Fn(&Task) + Send + Sync + 'static {
        let rec = self.clone();
        let name = name.to_string();
        move |_task: &Task| rec.record(name.clone())
    }

    /// Callback that records `name` and returns `rc`.
    pub fn callback(&self, name: &str, rc: ResultCode) -> impl FnOnce(&Task) -> ResultCode + Send + 'static {
        let rec = self.clone();
        let name = name.to_string();
        move |_task: &Task| {
            rec.record(name);
            rc
        }
    }
}

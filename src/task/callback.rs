// src/task/callback.rs

//! Preparation and completion callback records.

use std::collections::VecDeque;
use std::fmt;

use crate::errors::Result;
use crate::task::Task;
use crate::types::ResultCode;

/// Boxed callback as stored in a [`CallbackRecord`].
///
/// Receives the task and the record's copied payload; the return value is
/// folded into the task result (first non-zero wins).
pub(crate) type TaskCallbackFn = Box<dyn FnOnce(&Task, &[u8]) -> ResultCode + Send + 'static>;

/// Which of a task's two callback queues a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackKind {
    Prep,
    Completion,
}

/// A registered callback plus the payload bytes copied at registration time.
///
/// Consumed exactly once: it is popped from its queue before being invoked,
/// and dropped without being invoked if the task is released first.
pub(crate) struct CallbackRecord {
    func: TaskCallbackFn,
    payload: Vec<u8>,
}

impl CallbackRecord {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnOnce(&Task) -> ResultCode + Send + 'static,
    {
        Self {
            func: Box::new(move |task, _payload| f(task)),
            payload: Vec::new(),
        }
    }

    /// Copy `payload` into a new record for a plain function callback.
    pub(crate) fn with_payload(
        f: fn(&Task, &[u8]) -> ResultCode,
        payload: &[u8],
    ) -> Result<Self> {
        let mut copied = Vec::new();
        copied.try_reserve_exact(payload.len())?;
        copied.extend_from_slice(payload);

        Ok(Self {
            func: Box::new(f),
            payload: copied,
        })
    }

    pub(crate) fn invoke(self, task: &Task) -> ResultCode {
        let CallbackRecord { func, payload } = self;
        func(task, &payload)
    }
}

impl fmt::Debug for CallbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRecord")
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// FIFO queue of callback records.
#[derive(Debug, Default)]
pub(crate) struct CallbackQueue {
    records: VecDeque<CallbackRecord>,
}

impl CallbackQueue {
    pub(crate) fn push(&mut self, record: CallbackRecord) -> Result<()> {
        self.records.try_reserve(1)?;
        self.records.push_back(record);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<CallbackRecord> {
        self.records.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

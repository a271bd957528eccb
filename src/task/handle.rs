// src/task/handle.rs

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, trace};

use crate::errors::{Result, SchedError};
use crate::sched::Scheduler;
use crate::sync::lock;
use crate::task::{CallbackKind, CallbackRecord};
use crate::task::scratch::Scratch;
use crate::types::{ResultCode, TaskId, TaskState, UserData};

/// Task body. Invoked once per run; it must eventually lead to
/// [`Task::complete`] (or [`Task::reinit`]) on the same task, either before
/// returning or later from anywhere else.
pub type TaskBody = Arc<dyn Fn(&Task) + Send + Sync + 'static>;

struct TaskInner {
    id: TaskId,
    sched: Scheduler,
    body: Mutex<Option<TaskBody>>,
    running: AtomicBool,
    completed: AtomicBool,
    no_propagate: AtomicBool,
    user_linked: AtomicBool,
    generation: AtomicU64,
    result: AtomicI32,
    scratch: Mutex<Scratch>,
    private: Mutex<Option<UserData>>,
    private_internal: Mutex<Option<UserData>>,
}

/// Cloneable handle to a scheduled unit of work.
///
/// Clones share the same task. Engine-level lifetime (when the scheduler
/// forgets the task) is tracked separately through [`Task::addref`] /
/// [`Task::decref`]; a handle stays usable for reading flags and the result
/// after the engine has released the task.
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    /// Create a task owned by `sched`, in Init state with one engine
    /// reference. A task without a body is a barrier.
    pub fn create(
        body: Option<TaskBody>,
        sched: &Scheduler,
        private: Option<UserData>,
    ) -> Result<Task> {
        let task = Task {
            inner: Arc::new(TaskInner {
                id: TaskId::next(),
                sched: sched.clone(),
                body: Mutex::new(body),
                running: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                no_propagate: AtomicBool::new(false),
                user_linked: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                result: AtomicI32::new(0),
                scratch: Mutex::new(Scratch::new(sched.scratch_capacity())),
                private: Mutex::new(private),
                private_internal: Mutex::new(None),
            }),
        };

        {
            let mut st = sched.lock_state();
            st.insert_task(task.clone())?;
        }

        trace!(task = %task.id(), barrier = !task.has_body(), "task created");
        Ok(task)
    }

    pub fn with_body<F>(sched: &Scheduler, body: F) -> Result<Task>
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        Self::create(Some(Arc::new(body)), sched, None)
    }

    pub fn barrier(sched: &Scheduler) -> Result<Task> {
        Self::create(None, sched, None)
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.sched
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_flags(self.is_running(), self.is_completed())
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    pub fn result(&self) -> ResultCode {
        self.inner.result.load(Ordering::Acquire)
    }

    /// Record `rc` unless a non-zero result is already set.
    pub fn set_result(&self, rc: ResultCode) {
        if rc != 0 {
            let _ = self
                .inner
                .result
                .compare_exchange(0, rc, Ordering::AcqRel, Ordering::Acquire);
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Number of unfinished tasks this one waits on (0 once released).
    pub fn dependency_count(&self) -> u32 {
        let st = self.inner.sched.lock_state();
        st.dependency_count(self.id())
    }

    /// Keep a failing dependency's result out of this task's result.
    pub fn set_no_propagate(&self, value: bool) {
        self.inner.no_propagate.store(value, Ordering::Release);
    }

    pub fn no_propagate(&self) -> bool {
        self.inner.no_propagate.load(Ordering::Acquire)
    }

    pub fn has_body(&self) -> bool {
        lock(&self.inner.body).is_some()
    }

    pub fn private_data(&self) -> Option<UserData> {
        lock(&self.inner.private).clone()
    }

    /// Replace the caller's private data, returning the previous value.
    pub fn set_private_data(&self, data: Option<UserData>) -> Option<UserData> {
        std::mem::replace(&mut *lock(&self.inner.private), data)
    }

    /// Private slot reserved for layers built on top of the engine.
    pub fn private_internal(&self) -> Option<UserData> {
        lock(&self.inner.private_internal).clone()
    }

    pub fn set_private_internal(&self, data: Option<UserData>) -> Option<UserData> {
        std::mem::replace(&mut *lock(&self.inner.private_internal), data)
    }

    // ---------------------------------------------------------------------
    // Engine references
    // ---------------------------------------------------------------------

    /// Take an engine reference, keeping the task known to its scheduler.
    pub fn addref(&self) -> Result<()> {
        let mut st = self.inner.sched.lock_state();
        st.addref_task(self)
    }

    /// Drop an engine reference taken by [`Task::addref`] or [`Task::create`].
    pub fn decref(&self) {
        self.release();
    }

    pub(crate) fn release(&self) {
        let slot = {
            let mut st = self.inner.sched.lock_state();
            st.release_task(self.id())
        };
        drop(slot);
    }

    // ---------------------------------------------------------------------
    // Dependencies and callbacks
    // ---------------------------------------------------------------------

    /// Make this task wait for `dep` to complete.
    ///
    /// A no-op if `dep` already completed. `dep` may belong to another
    /// scheduler; only one scheduler lock is held at any time.
    pub fn add_dependency(&self, dep: &Task) -> Result<()> {
        if self.is_completed() {
            return Err(SchedError::PermissionDenied(format!(
                "{} is completed, cannot add a dependency",
                self.id()
            )));
        }
        if self.id() == dep.id() {
            return Err(SchedError::InvalidArgument(format!(
                "{} cannot depend on itself",
                self.id()
            )));
        }
        if dep.is_completed() {
            trace!(task = %self.id(), dep = %dep.id(), "dependency already completed");
            return Ok(());
        }

        let sched = self.scheduler();
        let dep_sched = dep.scheduler();

        if sched.same_as(dep_sched) {
            let mut st = sched.lock_state();
            st.add_dependency(self, dep)?;
        } else {
            {
                let mut st = sched.lock_state();
                st.reserve_dependency(self)?;
            }

            let linked = {
                let mut st = dep_sched.lock_state();
                st.push_waiter(dep, self)
            };

            if !matches!(linked, Ok(true)) {
                let slot = {
                    let mut st = sched.lock_state();
                    st.cancel_dependency(self)
                };
                drop(slot);
            }
            linked?;
        }

        trace!(task = %self.id(), dep = %dep.id(), "dependency added");
        Ok(())
    }

    /// Add several dependencies, stopping at the first error.
    pub fn register_deps(&self, deps: &[Task]) -> Result<()> {
        for dep in deps {
            self.add_dependency(dep)?;
        }
        Ok(())
    }

    /// Run `cb` once dependencies are met, before the body. A non-zero return
    /// becomes the task result if none is set yet.
    pub fn register_prep_callback<F>(&self, cb: F) -> Result<()>
    where
        F: FnOnce(&Task) -> ResultCode + Send + 'static,
    {
        self.push_callback(CallbackKind::Prep, CallbackRecord::new(cb))
    }

    /// Run `cb` when the task completes, before it is marked Completed.
    pub fn register_completion_callback<F>(&self, cb: F) -> Result<()>
    where
        F: FnOnce(&Task) -> ResultCode + Send + 'static,
    {
        self.push_callback(CallbackKind::Completion, CallbackRecord::new(cb))
    }

    /// Like [`Task::register_prep_callback`], with `payload` copied into the
    /// record and handed back to `cb`.
    pub fn register_prep_callback_with_payload(
        &self,
        cb: fn(&Task, &[u8]) -> ResultCode,
        payload: &[u8],
    ) -> Result<()> {
        let record = CallbackRecord::with_payload(cb, payload)?;
        self.push_callback(CallbackKind::Prep, record)
    }

    pub fn register_completion_callback_with_payload(
        &self,
        cb: fn(&Task, &[u8]) -> ResultCode,
        payload: &[u8],
    ) -> Result<()> {
        let record = CallbackRecord::with_payload(cb, payload)?;
        self.push_callback(CallbackKind::Completion, record)
    }

    fn push_callback(&self, kind: CallbackKind, record: CallbackRecord) -> Result<()> {
        let mut st = self.inner.sched.lock_state();
        st.push_callback(self, kind, record)
    }

    /// Run queued callbacks of `kind` one at a time.
    ///
    /// Returns `false` as soon as a callback changes the task's generation
    /// (reinit, reset, new dependency); the remaining records stay queued.
    /// Once a prep callback completes the task, the prep records left are
    /// dropped without being invoked.
    pub(crate) fn run_callbacks(&self, kind: CallbackKind) -> bool {
        loop {
            if kind == CallbackKind::Prep && self.is_completed() {
                let discarded = {
                    let mut st = self.inner.sched.lock_state();
                    st.take_callbacks(self.id(), kind)
                };
                if !discarded.is_empty() {
                    trace!(task = %self.id(), "completed by a prep callback, skipping the rest");
                }
                drop(discarded);
                return true;
            }

            let record = {
                let mut st = self.inner.sched.lock_state();
                st.pop_callback(self.id(), kind)
            };
            let Some(record) = record else {
                return true;
            };

            let before = self.generation();
            let rc = record.invoke(self);
            if self.generation() != before {
                debug!(task = %self.id(), ?kind, "callback changed the task generation");
                return false;
            }
            self.set_result(rc);
        }
    }

    // ---------------------------------------------------------------------
    // Scheduling and completion
    // ---------------------------------------------------------------------

    /// Hand the task to its scheduler.
    ///
    /// A ready body-less task, or a ready task scheduled `instant`, goes
    /// straight to running; with `instant` the body runs before this returns.
    pub fn schedule(&self, instant: bool) -> Result<()> {
        self.schedule_with_delay(instant, Duration::ZERO)
    }

    /// Schedule, keeping the task asleep for at least `delay` first.
    pub fn schedule_with_delay(&self, instant: bool, delay: Duration) -> Result<()> {
        if instant && !delay.is_zero() {
            return Err(SchedError::InvalidArgument(
                "an instant task cannot be delayed".to_string(),
            ));
        }
        if instant && !self.has_body() {
            return Err(SchedError::InvalidArgument(format!(
                "{} has no body to run instantly",
                self.id()
            )));
        }
        if self.is_completed() {
            return Err(SchedError::PermissionDenied(format!(
                "{} is completed",
                self.id()
            )));
        }

        let sched = self.scheduler();
        let wake = wake_time(sched, delay);
        let run_now = {
            let mut st = sched.lock_state();
            st.schedule(self, instant, wake)?
        };

        if run_now {
            if let Some(body) = self.body() {
                body(self);
            }
            self.release();
        }
        Ok(())
    }

    /// Complete the task with `rc` (kept only if no result is set yet).
    ///
    /// Returns `false` if the task was already completed or a completion
    /// callback re-armed it.
    pub fn complete(&self, rc: ResultCode) -> bool {
        self.finish(rc, true)
    }

    pub(crate) fn finish(&self, rc: ResultCode, post_process: bool) -> bool {
        if self.is_completed() {
            return false;
        }
        self.set_result(rc);

        if !self.run_callbacks(CallbackKind::Completion) {
            return false;
        }

        let sched = self.scheduler();
        let (completed, cancelling) = {
            let mut st = sched.lock_state();
            (st.mark_completed(self), st.is_cancelling())
        };

        if completed && post_process && !cancelling {
            sched.process_complete();
        }
        completed
    }

    /// Return a completed (or self-re-arming running) task to Init and queue
    /// it again with a fresh generation.
    pub fn reinit(&self) -> Result<()> {
        self.reinit_with_delay(Duration::ZERO)
    }

    pub fn reinit_with_delay(&self, delay: Duration) -> Result<()> {
        let sched = self.scheduler();
        let wake = wake_time(sched, delay);
        let mut st = sched.lock_state();
        st.reinit(self, wake)
    }

    /// Re-target a completed, fully detached task at a new body and private
    /// data. The task is left in Init, unscheduled.
    pub fn reset(&self, body: Option<TaskBody>, private: Option<UserData>) -> Result<()> {
        {
            let mut st = self.scheduler().lock_state();
            st.reset(self)?;
        }

        let old_body = std::mem::replace(&mut *lock(&self.inner.body), body);
        let old_private = self.set_private_data(private);
        drop(old_body);
        drop(old_private);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Scratch space
    // ---------------------------------------------------------------------

    /// Run `f` on the embedded parameter block, sized to `size` bytes.
    ///
    /// The block keeps its contents across calls and re-runs; it shares the
    /// scratch capacity with the stack. `f` must not touch this task's
    /// scratch or call back into the engine.
    pub fn with_embedded<R>(&self, size: usize, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut scratch = lock(&self.inner.scratch);
        let block = scratch.embedded(size)?;
        Ok(f(block))
    }

    pub fn stack_push(&self, data: &[u8]) -> Result<()> {
        lock(&self.inner.scratch).push(data)
    }

    pub fn stack_pop(&self, out: &mut [u8]) -> Result<()> {
        lock(&self.inner.scratch).pop(out)
    }

    pub fn stack_pop_vec(&self, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.stack_pop(&mut out)?;
        Ok(out)
    }

    /// Bytes currently pushed on the scratch stack (rounded).
    pub fn stack_size(&self) -> usize {
        lock(&self.inner.scratch).stack_top()
    }

    // ---------------------------------------------------------------------
    // Engine internals
    // ---------------------------------------------------------------------

    pub(crate) fn body(&self) -> Option<TaskBody> {
        lock(&self.inner.body).clone()
    }

    pub(crate) fn set_running(&self, value: bool) {
        self.inner.running.store(value, Ordering::Release);
    }

    pub(crate) fn set_completed(&self, value: bool) {
        self.inner.completed.store(value, Ordering::Release);
    }

    pub(crate) fn clear_result(&self) {
        self.inner.result.store(0, Ordering::Release);
    }

    pub(crate) fn bump_generation(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn reset_scratch_stack(&self) -> usize {
        lock(&self.inner.scratch).reset_stack()
    }

    pub(crate) fn in_user_list(&self) -> bool {
        self.inner.user_linked.load(Ordering::Acquire)
    }

    /// Claim list membership. Returns `false` if already in a list.
    pub(crate) fn link_user_list(&self) -> bool {
        !self.inner.user_linked.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn unlink_user_list(&self) {
        self.inner.user_linked.store(false, Ordering::Release);
    }
}

fn wake_time(sched: &Scheduler, delay: Duration) -> u64 {
    if delay.is_zero() {
        return 0;
    }
    let micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
    sched.now_micros().saturating_add(micros.max(1))
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("result", &self.result())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

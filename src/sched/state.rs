// src/sched/state.rs

//! Lock-protected scheduler state.
//!
//! Everything here runs with the scheduler mutex held, so nothing in this
//! module may call into task bodies or callbacks. Values that can carry user
//! code on drop (released [`TaskSlot`]s, finalization leftovers) are handed
//! back to the caller to be dropped once the lock is gone.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, trace, warn};

use crate::errors::{Result, SchedError};
use crate::sched::SchedCallback;
use crate::task::{CallbackKind, CallbackQueue, CallbackRecord, DependencyLink, Task};
use crate::types::{ResultCode, TaskId};

/// Where a task currently lives from the scheduler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// In no collection: created but never scheduled, or fully post-processed.
    Detached,
    Init(u64),
    /// `(wake_time, seq)`.
    Sleeping(u64, u64),
    Running(u64),
    /// Drained from init by a drive pass, not yet started.
    Ready,
    Complete(u64),
    /// Taken off the complete collection; waiters are being processed.
    PostProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Init,
    Sleeping,
    Running,
    Complete,
}

/// Engine-side bookkeeping for one task.
#[derive(Debug)]
pub(crate) struct TaskSlot {
    task: Task,
    refcount: u32,
    dep_count: u32,
    waiters: VecDeque<DependencyLink>,
    prep_cbs: CallbackQueue,
    comp_cbs: CallbackQueue,
    wake_time: u64,
    placement: Placement,
}

impl TaskSlot {
    fn new(task: Task) -> Self {
        Self {
            task,
            refcount: 1,
            dep_count: 0,
            waiters: VecDeque::new(),
            prep_cbs: CallbackQueue::default(),
            comp_cbs: CallbackQueue::default(),
            wake_time: 0,
            placement: Placement::Detached,
        }
    }

    fn callbacks_mut(&mut self, kind: CallbackKind) -> &mut CallbackQueue {
        match kind {
            CallbackKind::Prep => &mut self.prep_cbs,
            CallbackKind::Completion => &mut self.comp_cbs,
        }
    }
}

/// What a drive pass should do with a task drained from init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    /// The scheduler is cancelling: complete with this code, skip the body.
    Cancelled(ResultCode),
    /// Completed while waiting on the ready list; nothing left to run.
    AlreadyCompleted,
    /// Marked running with an extra reference held for the pass.
    Started,
    /// Gained a dependency after being drained; back on init.
    Blocked,
}

/// Everything dropped when a scheduler's last reference goes away. Only
/// held so that the drop happens after the lock is released.
pub(crate) struct Leftovers {
    _slots: Vec<TaskSlot>,
    _callbacks: VecDeque<SchedCallback>,
}

pub(crate) struct SchedState {
    slots: HashMap<TaskId, TaskSlot>,
    init: BTreeMap<u64, TaskId>,
    sleeping: BTreeMap<(u64, u64), TaskId>,
    running: BTreeMap<u64, TaskId>,
    complete: BTreeMap<u64, TaskId>,
    comp_cbs: VecDeque<SchedCallback>,
    next_seq: u64,
    inflight: u64,
    refcount: u32,
    cancelling: bool,
    completing: bool,
    finalized: bool,
    result: ResultCode,
    cancel_code: ResultCode,
}

impl SchedState {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            init: BTreeMap::new(),
            sleeping: BTreeMap::new(),
            running: BTreeMap::new(),
            complete: BTreeMap::new(),
            comp_cbs: VecDeque::new(),
            next_seq: 0,
            inflight: 0,
            refcount: 1,
            cancelling: false,
            completing: false,
            finalized: false,
            result: 0,
            cancel_code: 0,
        }
    }

    // ---------------------------------------------------------------------
    // Scheduler-level fields
    // ---------------------------------------------------------------------

    pub(crate) fn inflight(&self) -> u64 {
        self.inflight
    }

    pub(crate) fn result(&self) -> ResultCode {
        self.result
    }

    pub(crate) fn is_cancelling(&self) -> bool {
        self.cancelling
    }

    pub(crate) fn cancel_code(&self) -> ResultCode {
        self.cancel_code
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Sticky: only the first non-zero result is kept.
    pub(crate) fn set_result(&mut self, rc: ResultCode) {
        if self.result == 0 {
            self.result = rc;
        }
    }

    /// Enter cancelling or completing mode. Returns `false` if either mode
    /// was already entered.
    pub(crate) fn begin_completion(&mut self, cancel: bool, code: ResultCode) -> bool {
        if self.cancelling || self.completing {
            return false;
        }
        if cancel {
            self.cancelling = true;
            self.cancel_code = code;
        } else {
            self.completing = true;
        }
        true
    }

    /// Init and sleeping collections empty and nothing in flight.
    pub(crate) fn is_idle(&self) -> bool {
        self.init.is_empty() && self.sleeping.is_empty() && self.inflight == 0
    }

    pub(crate) fn push_sched_callback(&mut self, cb: SchedCallback) -> Result<()> {
        if self.finalized {
            return Err(SchedError::PermissionDenied(
                "scheduler has been finalized".to_string(),
            ));
        }
        self.comp_cbs.try_reserve(1)?;
        self.comp_cbs.push_back(cb);
        Ok(())
    }

    pub(crate) fn pop_sched_callback(&mut self) -> Option<SchedCallback> {
        self.comp_cbs.pop_front()
    }

    pub(crate) fn addref(&mut self) {
        self.refcount += 1;
    }

    /// Drop one scheduler reference. On the last one the scheduler is
    /// finalized and whatever it still owns is returned for dropping.
    pub(crate) fn decref(&mut self) -> Option<Leftovers> {
        if self.refcount == 0 {
            warn!("scheduler reference released more often than taken");
            return None;
        }
        self.refcount -= 1;
        if self.refcount > 0 {
            return None;
        }

        if self.inflight != 0
            || !self.init.is_empty()
            || !self.sleeping.is_empty()
            || !self.running.is_empty()
            || !self.complete.is_empty()
        {
            warn!(
                inflight = self.inflight,
                init = self.init.len(),
                sleeping = self.sleeping.len(),
                running = self.running.len(),
                complete = self.complete.len(),
                "finalizing a scheduler that still holds tasks"
            );
        }

        self.finalized = true;
        self.init.clear();
        self.sleeping.clear();
        self.running.clear();
        self.complete.clear();
        debug!(tasks = self.slots.len(), "scheduler finalized");

        Some(Leftovers {
            _slots: self.slots.drain().map(|(_, slot)| slot).collect(),
            _callbacks: std::mem::take(&mut self.comp_cbs),
        })
    }

    // ---------------------------------------------------------------------
    // Arena and collections
    // ---------------------------------------------------------------------

    pub(crate) fn insert_task(&mut self, task: Task) -> Result<()> {
        if self.finalized {
            return Err(SchedError::PermissionDenied(
                "scheduler has been finalized".to_string(),
            ));
        }
        self.slots.try_reserve(1)?;
        self.slots.insert(task.id(), TaskSlot::new(task));
        Ok(())
    }

    fn slot_mut(&mut self, task: &Task) -> Result<&mut TaskSlot> {
        self.slots
            .get_mut(&task.id())
            .ok_or_else(|| SchedError::InvalidArgument(format!("{} has been released", task.id())))
    }

    pub(crate) fn dependency_count(&self, id: TaskId) -> u32 {
        self.slots.get(&id).map_or(0, |slot| slot.dep_count)
    }

    pub(crate) fn placement(&self, id: TaskId) -> Option<Placement> {
        self.slots.get(&id).map(|slot| slot.placement)
    }

    fn unlink(&mut self, id: TaskId) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        match std::mem::replace(&mut slot.placement, Placement::Detached) {
            Placement::Init(seq) => {
                self.init.remove(&seq);
            }
            Placement::Sleeping(wake, seq) => {
                self.sleeping.remove(&(wake, seq));
            }
            Placement::Running(seq) => {
                self.running.remove(&seq);
            }
            Placement::Complete(seq) => {
                self.complete.remove(&seq);
            }
            Placement::Detached | Placement::Ready | Placement::PostProcessing => {}
        }
    }

    /// Move a task to the tail of `queue` (sleeping: in wake-time order).
    fn move_to(&mut self, id: TaskId, queue: Queue) {
        self.unlink(id);

        let seq = self.next_seq;
        self.next_seq += 1;

        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        slot.placement = match queue {
            Queue::Init => {
                self.init.insert(seq, id);
                Placement::Init(seq)
            }
            Queue::Sleeping => {
                let wake = slot.wake_time;
                self.sleeping.insert((wake, seq), id);
                Placement::Sleeping(wake, seq)
            }
            Queue::Running => {
                self.running.insert(seq, id);
                Placement::Running(seq)
            }
            Queue::Complete => {
                self.complete.insert(seq, id);
                Placement::Complete(seq)
            }
        };
    }

    fn enqueue(&mut self, id: TaskId, wake: u64) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.wake_time = wake;
        }
        if wake == 0 {
            self.move_to(id, Queue::Init);
        } else {
            self.move_to(id, Queue::Sleeping);
        }
    }

    // ---------------------------------------------------------------------
    // Task references
    // ---------------------------------------------------------------------

    pub(crate) fn addref_task(&mut self, task: &Task) -> Result<()> {
        let slot = self.slot_mut(task)?;
        slot.refcount += 1;
        Ok(())
    }

    /// Drop one task reference. Returns the slot once the last one is gone.
    pub(crate) fn release_task(&mut self, id: TaskId) -> Option<TaskSlot> {
        let slot = match self.slots.get_mut(&id) {
            Some(slot) => slot,
            None => {
                warn!(task = %id, "released a task that has no engine references");
                return None;
            }
        };

        slot.refcount = slot.refcount.saturating_sub(1);
        if slot.refcount > 0 {
            return None;
        }

        if !slot.waiters.is_empty() {
            warn!(task = %id, waiters = slot.waiters.len(), "releasing a task with pending waiters");
        }
        if !matches!(slot.placement, Placement::Detached | Placement::PostProcessing) {
            warn!(task = %id, placement = ?slot.placement, "releasing a task that is still queued");
        }

        self.unlink(id);
        trace!(task = %id, "task released");
        self.slots.remove(&id)
    }

    // ---------------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------------

    /// Place a task in the scheduler. Returns `true` if the caller has to
    /// invoke the body right away; an extra task reference is then held for
    /// the call.
    pub(crate) fn schedule(&mut self, task: &Task, instant: bool, wake: u64) -> Result<bool> {
        let id = task.id();
        let has_body = task.has_body();
        let slot = self.slot_mut(task)?;

        if slot.placement != Placement::Detached {
            return Err(SchedError::PermissionDenied(format!(
                "{id} is already scheduled"
            )));
        }

        let ready = slot.dep_count == 0 && slot.prep_cbs.is_empty();
        let run_now = ready && (instant || !has_body);

        if run_now {
            if instant {
                slot.refcount += 1;
            }
            task.set_running(true);
            self.move_to(id, Queue::Running);
            self.inflight += 1;
        } else {
            self.enqueue(id, wake);
        }
        self.refcount += 1;

        trace!(task = %id, instant, wake, run_now, "task scheduled");
        Ok(run_now && instant)
    }

    /// Return a completed or running task to init (or sleeping).
    pub(crate) fn reinit(&mut self, task: &Task, wake: u64) -> Result<()> {
        let id = task.id();
        if self.cancelling {
            return Err(SchedError::PermissionDenied(
                "scheduler is cancelling, cannot re-insert a task".to_string(),
            ));
        }
        if !task.has_body() {
            return Err(SchedError::InvalidArgument(format!(
                "{id} has no body to run again"
            )));
        }

        if task.is_completed() {
            match self.slots.get_mut(&id) {
                Some(slot) if slot.placement != Placement::Detached => {
                    return Err(SchedError::PermissionDenied(format!(
                        "{id} is still being post-processed"
                    )));
                }
                Some(slot) => slot.refcount += 1,
                None => self.insert_task(task.clone())?,
            }
            self.refcount += 1;
        } else if task.is_running() {
            self.inflight = self.inflight.saturating_sub(1);
        } else {
            return Err(SchedError::PermissionDenied(format!(
                "{id} is neither running nor completed"
            )));
        }

        self.rearm(task);
        self.enqueue(id, wake);
        debug!(task = %id, wake, generation = task.generation(), "task re-armed");
        Ok(())
    }

    /// Check that a completed task can be re-targeted and return it to Init,
    /// detached from every collection.
    pub(crate) fn reset(&mut self, task: &Task) -> Result<()> {
        let id = task.id();
        if self.cancelling {
            return Err(SchedError::PermissionDenied(
                "scheduler is cancelling, cannot reset a task".to_string(),
            ));
        }
        if !task.is_completed() {
            return Err(SchedError::PermissionDenied(format!(
                "{id} is not completed"
            )));
        }
        if task.in_user_list() {
            return Err(SchedError::PermissionDenied(format!(
                "{id} is still in a task list"
            )));
        }

        match self.slots.get(&id) {
            Some(slot) => {
                let busy = slot.placement != Placement::Detached
                    || !slot.waiters.is_empty()
                    || !slot.prep_cbs.is_empty()
                    || !slot.comp_cbs.is_empty();
                if busy {
                    return Err(SchedError::PermissionDenied(format!(
                        "{id} still has queued work"
                    )));
                }
            }
            None => self.insert_task(task.clone())?,
        }

        self.rearm(task);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.wake_time = 0;
        }
        debug!(task = %id, "task reset");
        Ok(())
    }

    fn rearm(&mut self, task: &Task) {
        task.set_running(false);
        task.set_completed(false);
        task.clear_result();

        let leftover = task.reset_scratch_stack();
        if leftover != 0 {
            warn!(task = %task.id(), bytes = leftover, "scratch stack was not empty, reset to zero");
        }

        task.bump_generation();
    }

    // ---------------------------------------------------------------------
    // Dependencies
    // ---------------------------------------------------------------------

    /// Record `task` as depending on `dep` when both share this scheduler.
    pub(crate) fn add_dependency(&mut self, task: &Task, dep: &Task) -> Result<()> {
        self.check_can_depend(task)?;
        if dep.is_completed() {
            return Ok(());
        }

        self.slot_mut(dep)?.waiters.try_reserve(1)?;
        self.take_dependency(task)?;
        self.slot_mut(dep)?
            .waiters
            .push_back(DependencyLink::new(task.clone()));
        Ok(())
    }

    /// First half of a cross-scheduler dependency, under the dependent's lock.
    pub(crate) fn reserve_dependency(&mut self, task: &Task) -> Result<()> {
        self.check_can_depend(task)?;
        self.take_dependency(task)
    }

    /// Undo [`Self::reserve_dependency`] when the link could not be inserted.
    pub(crate) fn cancel_dependency(&mut self, task: &Task) -> Option<TaskSlot> {
        let slot = self.slots.get_mut(&task.id())?;
        slot.dep_count = slot.dep_count.saturating_sub(1);
        self.release_task(task.id())
    }

    /// Second half of a cross-scheduler dependency, under the depended-upon
    /// task's lock. Returns `false` if `dep` completed in the meantime.
    pub(crate) fn push_waiter(&mut self, dep: &Task, dependent: &Task) -> Result<bool> {
        if dep.is_completed() {
            return Ok(false);
        }
        let slot = self.slot_mut(dep)?;
        slot.waiters.try_reserve(1)?;
        slot.waiters.push_back(DependencyLink::new(dependent.clone()));
        Ok(true)
    }

    fn check_can_depend(&self, task: &Task) -> Result<()> {
        if self.cancelling {
            return Err(SchedError::PermissionDenied(
                "scheduler is cancelling, cannot add a dependency".to_string(),
            ));
        }
        if task.is_completed() {
            return Err(SchedError::PermissionDenied(format!(
                "{} is completed",
                task.id()
            )));
        }
        Ok(())
    }

    fn take_dependency(&mut self, task: &Task) -> Result<()> {
        let slot = self.slot_mut(task)?;
        slot.refcount += 1;
        slot.dep_count += 1;
        task.bump_generation();
        Ok(())
    }

    pub(crate) fn pop_waiter(&mut self, id: TaskId) -> Option<DependencyLink> {
        self.slots.get_mut(&id)?.waiters.pop_front()
    }

    /// One dependency of `dependent` finished with `result`. Returns `true`
    /// if the dependent should now be completed.
    pub(crate) fn satisfy_dependency(&mut self, dependent: &Task, result: ResultCode) -> bool {
        let id = dependent.id();
        let Some(slot) = self.slots.get_mut(&id) else {
            warn!(task = %id, "dependency satisfied on a released task");
            return false;
        };

        if slot.dep_count == 0 {
            warn!(task = %id, "dependency count already zero");
        }
        slot.dep_count = slot.dep_count.saturating_sub(1);

        if result != 0 && !dependent.no_propagate() {
            dependent.set_result(result);
        }

        trace!(task = %id, remaining = slot.dep_count, result, "dependency satisfied");

        slot.dep_count == 0
            && !self.cancelling
            && dependent.is_running()
            && !dependent.is_completed()
    }

    // ---------------------------------------------------------------------
    // Callbacks
    // ---------------------------------------------------------------------

    pub(crate) fn push_callback(
        &mut self,
        task: &Task,
        kind: CallbackKind,
        record: CallbackRecord,
    ) -> Result<()> {
        let id = task.id();
        if task.is_completed() {
            return Err(SchedError::PermissionDenied(format!(
                "cannot add a callback to completed {id}"
            )));
        }
        if kind == CallbackKind::Prep && self.cancelling {
            return Err(SchedError::PermissionDenied(
                "scheduler is cancelling, cannot add a prep callback".to_string(),
            ));
        }
        self.slot_mut(task)?.callbacks_mut(kind).push(record)
    }

    pub(crate) fn pop_callback(&mut self, id: TaskId, kind: CallbackKind) -> Option<CallbackRecord> {
        self.slots.get_mut(&id)?.callbacks_mut(kind).pop()
    }

    /// Empty a callback queue. The records are returned to be dropped
    /// without being invoked once the lock is gone.
    pub(crate) fn take_callbacks(&mut self, id: TaskId, kind: CallbackKind) -> CallbackQueue {
        self.slots
            .get_mut(&id)
            .map(|slot| std::mem::take(slot.callbacks_mut(kind)))
            .unwrap_or_default()
    }

    // ---------------------------------------------------------------------
    // Drive loop support
    // ---------------------------------------------------------------------

    /// Move sleeping tasks whose wake time has passed (all of them if `all`)
    /// to the tail of init, in wake-time order.
    pub(crate) fn promote_sleeping(&mut self, now: u64, all: bool) -> usize {
        let mut promoted = 0;
        loop {
            let Some((&(wake, _), &id)) = self.sleeping.first_key_value() else {
                break;
            };
            if !all && wake > now {
                break;
            }
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.wake_time = 0;
            }
            self.move_to(id, Queue::Init);
            promoted += 1;
        }
        promoted
    }

    /// Take every init task without outstanding dependencies (every init
    /// task while cancelling), counting each as inflight.
    pub(crate) fn drain_ready(&mut self) -> Vec<Task> {
        let all = self.cancelling;
        let ids: Vec<TaskId> = self
            .init
            .values()
            .copied()
            .filter(|id| all || self.slots.get(id).is_some_and(|slot| slot.dep_count == 0))
            .collect();

        let mut ready = Vec::with_capacity(ids.len());
        for id in ids {
            self.unlink(id);
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.placement = Placement::Ready;
                ready.push(slot.task.clone());
                self.inflight += 1;
            }
        }
        ready
    }

    pub(crate) fn start_running(&mut self, task: &Task) -> StartOutcome {
        if self.cancelling {
            return StartOutcome::Cancelled(self.cancel_code);
        }
        let id = task.id();
        if task.is_completed() {
            return StartOutcome::AlreadyCompleted;
        }
        let Some(slot) = self.slots.get_mut(&id) else {
            return StartOutcome::AlreadyCompleted;
        };
        if slot.placement != Placement::Ready {
            return StartOutcome::AlreadyCompleted;
        }
        if slot.dep_count > 0 {
            let deps = slot.dep_count;
            self.move_to(id, Queue::Init);
            self.inflight = self.inflight.saturating_sub(1);
            debug!(task = %id, deps, "dependency added while ready, task back on init");
            return StartOutcome::Blocked;
        }

        slot.refcount += 1;
        task.set_running(true);
        self.move_to(id, Queue::Running);
        trace!(task = %id, "task running");
        StartOutcome::Started
    }

    /// A prep pass was cut short: put a still-running task back on init so
    /// the rest of its prep callbacks and its body run on a later pass.
    pub(crate) fn requeue_interrupted(&mut self, task: &Task) -> bool {
        let id = task.id();
        let running = matches!(self.placement(id), Some(Placement::Running(_)));
        if !running || task.is_completed() {
            return false;
        }

        task.set_running(false);
        self.move_to(id, Queue::Init);
        self.inflight = self.inflight.saturating_sub(1);
        debug!(task = %id, "prep pass interrupted, task back on init");
        true
    }

    /// Mark a task Completed and move it to the complete collection.
    ///
    /// A task that never went through a drive pass is counted inflight here
    /// (and, if it was never scheduled, takes a scheduler reference) so that
    /// post-processing can release it like any other. Returns `false` if the
    /// task was already completed.
    pub(crate) fn mark_completed(&mut self, task: &Task) -> bool {
        let id = task.id();
        if task.is_completed() {
            return false;
        }

        match self.placement(id) {
            Some(Placement::Running(_)) | Some(Placement::Ready) => {}
            Some(Placement::Init(_)) | Some(Placement::Sleeping(..)) => self.inflight += 1,
            Some(Placement::Detached) => {
                self.inflight += 1;
                self.refcount += 1;
            }
            Some(Placement::Complete(_)) | Some(Placement::PostProcessing) => return false,
            None => {
                warn!(task = %id, "completing a released task");
                task.set_running(false);
                task.set_completed(true);
                return true;
            }
        }

        task.set_running(false);
        task.set_completed(true);
        self.move_to(id, Queue::Complete);
        trace!(task = %id, result = task.result(), "task completed");
        true
    }

    /// Splice the complete collection out for post-processing.
    pub(crate) fn take_complete(&mut self) -> Vec<Task> {
        let ids: Vec<TaskId> = std::mem::take(&mut self.complete).into_values().collect();
        ids.into_iter()
            .filter_map(|id| {
                let slot = self.slots.get_mut(&id)?;
                slot.placement = Placement::PostProcessing;
                Some(slot.task.clone())
            })
            .collect()
    }

    pub(crate) fn finish_post_processing(&mut self, id: TaskId) {
        self.inflight = self.inflight.saturating_sub(1);
        if let Some(slot) = self.slots.get_mut(&id) {
            if slot.placement == Placement::PostProcessing {
                slot.placement = Placement::Detached;
            }
        }
    }

    /// Running tasks with no outstanding dependencies.
    pub(crate) fn running_without_deps(&self) -> Vec<Task> {
        self.running
            .values()
            .filter_map(|id| self.slots.get(id))
            .filter(|slot| slot.dep_count == 0)
            .map(|slot| slot.task.clone())
            .collect()
    }
}

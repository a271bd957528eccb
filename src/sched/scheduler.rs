// src/sched/scheduler.rs

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::clock::{Clock, MonotonicClock};
use crate::errors::Result;
use crate::sched::drive;
use crate::sched::state::SchedState;
use crate::sync::lock;
use crate::types::{DEFAULT_SCRATCH_CAPACITY, ResultCode, UserData};

/// Scheduler completion callback. Receives the aggregate scheduler result;
/// a non-zero return becomes the result if none was recorded yet.
pub type SchedCallback = Box<dyn FnOnce(ResultCode) -> ResultCode + Send + 'static>;

/// Knobs fixed at scheduler creation.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Bytes of scratch space given to every task of this scheduler.
    pub scratch_capacity: usize,
    /// Time source for delayed scheduling.
    pub clock: Arc<dyn Clock>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

struct SchedInner {
    state: Mutex<SchedState>,
    options: SchedulerOptions,
    user_data: Mutex<Option<UserData>>,
}

/// Cloneable handle to a task scheduler.
///
/// A scheduler owns the tasks created against it and drives them through
/// its collections each time [`Scheduler::progress`] is called. It is
/// finalized once its reference count drops to zero, normally at the end of
/// [`Scheduler::complete`].
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedInner>,
}

impl Scheduler {
    /// Create a scheduler with default options.
    pub fn init(callback: Option<SchedCallback>, user_data: Option<UserData>) -> Result<Self> {
        Self::init_with_options(SchedulerOptions::default(), callback, user_data)
    }

    pub fn init_with_options(
        options: SchedulerOptions,
        callback: Option<SchedCallback>,
        user_data: Option<UserData>,
    ) -> Result<Self> {
        let mut state = SchedState::new();
        if let Some(cb) = callback {
            state.push_sched_callback(cb)?;
        }

        debug!(
            scratch_capacity = options.scratch_capacity,
            "scheduler created"
        );

        Ok(Self {
            inner: Arc::new(SchedInner {
                state: Mutex::new(state),
                options,
                user_data: Mutex::new(user_data),
            }),
        })
    }

    /// Append a callback run once by [`Scheduler::complete`], after every
    /// task has finished.
    pub fn register_completion_callback<F>(&self, cb: F) -> Result<()>
    where
        F: FnOnce(ResultCode) -> ResultCode + Send + 'static,
    {
        let mut st = self.lock_state();
        st.push_sched_callback(Box::new(cb))
    }

    /// Run the drive loop until it stops making progress.
    ///
    /// Does nothing while the scheduler is cancelling; [`Scheduler::complete`]
    /// drives it instead.
    pub fn progress(&self) {
        {
            let mut st = self.lock_state();
            if st.is_cancelling() {
                return;
            }
            st.addref();
        }
        self.run();
    }

    /// Drive passes until the scheduler is idle or a pass does nothing, then
    /// drop the reference the caller took for the run.
    fn run(&self) {
        loop {
            let mut processed = drive::process_init(self);
            processed += drive::process_complete(self);

            if self.check_complete() || processed == 0 {
                break;
            }
        }
        self.decref();
    }

    /// Wait for every task to finish and finalize the scheduler.
    ///
    /// With `cancel`, tasks that have not started complete with `result`
    /// instead of running, and running tasks without outstanding
    /// dependencies are force-completed. Bodies already executing elsewhere
    /// are not interrupted; this call spins until they complete.
    ///
    /// A second call (cancelling or not) is a no-op.
    pub fn complete(&self, result: ResultCode, cancel: bool) {
        {
            let mut st = self.lock_state();
            if !st.begin_completion(cancel, result) {
                return;
            }
            st.set_result(result);
        }

        info!(result, cancel, "completing scheduler");

        loop {
            self.addref();
            self.run();

            if self.check_complete() {
                break;
            }
            if self.is_cancelling() {
                drive::complete_inflight(self);
            } else {
                std::thread::yield_now();
            }
        }

        loop {
            let cb = {
                let mut st = self.lock_state();
                st.pop_sched_callback()
            };
            let Some(cb) = cb else {
                break;
            };
            let rc = cb(self.result());
            self.lock_state().set_result(rc);
        }

        let user_data = lock(&self.inner.user_data).take();
        drop(user_data);

        debug!(result = self.result(), "scheduler completed");
        self.decref();
    }

    /// `true` once init and sleeping are empty and nothing is in flight.
    pub fn check_complete(&self) -> bool {
        self.lock_state().is_idle()
    }

    /// Aggregate result: the first non-zero result recorded.
    pub fn result(&self) -> ResultCode {
        self.lock_state().result()
    }

    pub fn inflight(&self) -> u64 {
        self.lock_state().inflight()
    }

    pub fn is_cancelling(&self) -> bool {
        self.lock_state().is_cancelling()
    }

    pub fn is_finalized(&self) -> bool {
        self.lock_state().is_finalized()
    }

    pub fn addref(&self) {
        self.lock_state().addref();
    }

    pub fn decref(&self) {
        let leftovers = {
            let mut st = self.lock_state();
            st.decref()
        };
        drop(leftovers);
    }

    pub fn user_data(&self) -> Option<UserData> {
        lock(&self.inner.user_data).clone()
    }

    /// Whether both handles refer to the same scheduler.
    pub fn same_as(&self, other: &Scheduler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SchedState> {
        lock(&self.inner.state)
    }

    pub(crate) fn now_micros(&self) -> u64 {
        self.inner.options.clock.now_micros()
    }

    pub(crate) fn scratch_capacity(&self) -> usize {
        self.inner.options.scratch_capacity
    }

    pub(crate) fn process_complete(&self) -> usize {
        drive::process_complete(self)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // No state lock here: tasks are logged from inside locked sections.
        f.debug_struct("Scheduler")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .field("scratch_capacity", &self.inner.options.scratch_capacity)
            .finish_non_exhaustive()
    }
}

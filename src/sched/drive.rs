// src/sched/drive.rs

//! One pass of the drive loop, split into its init and complete halves.
//!
//! Both halves take the scheduler lock only for short bookkeeping steps and
//! run task bodies and callbacks with no lock held, so user code is free to
//! call back into the engine.

use tracing::{debug, trace};

use crate::sched::Scheduler;
use crate::sched::state::StartOutcome;
use crate::task::{CallbackKind, Task};

/// Promote due sleeping tasks, then start every ready init task.
///
/// Returns the number of tasks taken off init.
pub(crate) fn process_init(sched: &Scheduler) -> usize {
    let now = sched.now_micros();
    let ready = {
        let mut st = sched.lock_state();
        let cancelling = st.is_cancelling();
        let promoted = st.promote_sleeping(now, cancelling);
        if promoted > 0 {
            trace!(promoted, "woke sleeping tasks");
        }
        st.drain_ready()
    };

    let mut processed = 0;
    for task in ready {
        let outcome = {
            let mut st = sched.lock_state();
            st.start_running(&task)
        };

        match outcome {
            StartOutcome::Cancelled(code) => {
                trace!(task = %task.id(), code, "cancelled before running");
                task.finish(code, false);
            }
            StartOutcome::AlreadyCompleted => {}
            StartOutcome::Blocked => continue,
            StartOutcome::Started => {
                run_started(sched, &task);
                task.release();
            }
        }
        processed += 1;
    }
    processed
}

fn run_started(sched: &Scheduler, task: &Task) {
    if !task.run_callbacks(CallbackKind::Prep) {
        let mut st = sched.lock_state();
        st.requeue_interrupted(task);
        return;
    }

    if task.is_completed() {
        return;
    }
    if let Some(body) = task.body() {
        body(task);
    }
}

/// Post-process the complete collection until it stays empty.
///
/// Returns the number of tasks post-processed.
pub(crate) fn process_complete(sched: &Scheduler) -> usize {
    let mut processed = 0;
    loop {
        let batch = {
            let mut st = sched.lock_state();
            st.take_complete()
        };
        if batch.is_empty() {
            break;
        }

        for task in batch {
            post_process(sched, &task);

            let (slot, leftovers) = {
                let mut st = sched.lock_state();
                (st.release_task(task.id()), st.decref())
            };
            drop(slot);
            drop(leftovers);
            processed += 1;
        }
    }
    processed
}

/// Notify every waiter of a completed task, one link at a time.
fn post_process(sched: &Scheduler, task: &Task) {
    let id = task.id();
    let rc = task.result();

    sched.lock_state().set_result(rc);

    loop {
        let link = {
            let mut st = sched.lock_state();
            st.pop_waiter(id)
        };
        let Some(link) = link else {
            break;
        };

        let dependent = link.into_dependent();
        let dep_sched = dependent.scheduler();
        let ready = {
            let mut st = dep_sched.lock_state();
            st.satisfy_dependency(&dependent, rc)
        };

        if ready {
            // Same scheduler: the enclosing loop picks the dependent up.
            let post = !dep_sched.same_as(sched);
            dependent.finish(dependent.result(), post);
        }
        dependent.release();
    }

    let mut st = sched.lock_state();
    st.finish_post_processing(id);
}

/// Force-complete running tasks that wait on nothing. Cancellation only.
pub(crate) fn complete_inflight(sched: &Scheduler) {
    let (running, code) = {
        let st = sched.lock_state();
        (st.running_without_deps(), st.cancel_code())
    };
    if running.is_empty() {
        return;
    }

    debug!(tasks = running.len(), code, "force-completing running tasks");
    for task in running {
        task.finish(code, false);
    }
}

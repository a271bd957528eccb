mod common;

use std::time::Duration;

use common::{completing_task, new_sched, recording_task, sched_with_clock};
use tasksched::{SchedError, Task, TaskState};
use tasksched_test_utils::recorder::Recorder;

const CANCELLED: i32 = -125;

#[test]
fn test_cancel_completes_pending_tasks_without_running_them() {
    let sched = new_sched();
    let rec = Recorder::new();

    let a = completing_task(&sched, &rec, "a", 0);
    let b = completing_task(&sched, &rec, "b", 0);
    b.add_dependency(&a).unwrap();
    a.schedule(false).unwrap();
    b.schedule(false).unwrap();

    sched.complete(CANCELLED, true);

    assert!(rec.events().is_empty());
    for t in [&a, &b] {
        assert_eq!(t.state(), TaskState::Completed);
        assert_eq!(t.result(), CANCELLED);
    }
    assert_eq!(sched.result(), CANCELLED);
    assert_eq!(sched.inflight(), 0);
    assert!(sched.is_finalized());
}

#[test]
fn test_cancel_force_completes_running_tasks() {
    let sched = new_sched();
    let rec = Recorder::new();
    let task = recording_task(&sched, &rec, "r");

    task.schedule(false).unwrap();
    sched.progress();
    assert_eq!(task.state(), TaskState::Running);

    sched.complete(-1, true);

    assert_eq!(rec.events(), vec!["r"]);
    assert!(task.is_completed());
    assert_eq!(task.result(), -1);
    assert!(sched.is_finalized());

    // A late completion from the body's side is ignored.
    assert!(!task.complete(0));
    assert_eq!(task.result(), -1);
}

#[test]
fn test_cancel_wakes_sleeping_tasks_immediately() {
    let (sched, _clock) = sched_with_clock();
    let rec = Recorder::new();
    let task = completing_task(&sched, &rec, "late", 0);

    task.schedule_with_delay(false, Duration::from_secs(10))
        .unwrap();
    sched.complete(CANCELLED, true);

    assert!(rec.events().is_empty());
    assert!(task.is_completed());
    assert_eq!(task.result(), CANCELLED);
}

#[test]
fn test_cancel_finishes_running_task_after_its_subtasks() {
    let sched = new_sched();
    let rec = Recorder::new();

    let child = recording_task(&sched, &rec, "child");
    let child_in_body = child.clone();
    let parent = Task::with_body(&sched, move |t| {
        t.add_dependency(&child_in_body).unwrap();
        child_in_body.schedule(false).unwrap();
    })
    .unwrap();
    parent.schedule(false).unwrap();
    sched.progress();
    assert_eq!(parent.dependency_count(), 1);

    sched.complete(-5, true);

    assert!(child.is_completed());
    assert!(parent.is_completed());
    assert_eq!(child.result(), -5);
    assert_eq!(parent.result(), -5);
    assert!(sched.is_finalized());
}

#[test]
fn test_cancelled_tasks_still_run_completion_callbacks() {
    let sched = new_sched();
    let rec = Recorder::new();
    let task = completing_task(&sched, &rec, "body", 0);

    let r = rec.clone();
    task.register_completion_callback(move |t| {
        r.record(format!("comp:{}", t.result()));
        0
    })
    .unwrap();
    task.schedule(false).unwrap();

    sched.complete(CANCELLED, true);

    assert_eq!(rec.events(), vec![format!("comp:{CANCELLED}")]);
}

#[test]
fn test_mutations_are_denied_while_cancelling() {
    let sched = new_sched();
    let rec = Recorder::new();

    let s = sched.clone();
    let r = rec.clone();
    sched
        .register_completion_callback(move |_rc| {
            r.record(format!("cancelling:{}", s.is_cancelling()));

            let x = Task::barrier(&s).unwrap();
            let y = Task::barrier(&s).unwrap();

            let dep = x.add_dependency(&y);
            r.record(format!(
                "add_dependency denied:{}",
                matches!(dep, Err(SchedError::PermissionDenied(_)))
            ));

            let prep = x.register_prep_callback(|_| 0);
            r.record(format!(
                "prep denied:{}",
                matches!(prep, Err(SchedError::PermissionDenied(_)))
            ));

            let comp = x.register_completion_callback(|_| 0);
            r.record(format!("completion allowed:{}", comp.is_ok()));
            0
        })
        .unwrap();

    sched.complete(CANCELLED, true);

    assert_eq!(
        rec.events(),
        vec![
            "cancelling:true",
            "add_dependency denied:true",
            "prep denied:true",
            "completion allowed:true",
        ]
    );
}

#[test]
fn test_progress_is_noop_after_cancel() {
    let sched = new_sched();
    let rec = Recorder::new();
    sched.complete(CANCELLED, true);

    sched.progress();
    sched.complete(0, false);

    assert!(rec.events().is_empty());
    assert!(sched.is_cancelling());
    assert_eq!(sched.result(), CANCELLED);
}

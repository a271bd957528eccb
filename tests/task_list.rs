mod common;

use common::{completing_task, new_sched, recording_task};
use tasksched::{SchedError, Task, TaskList, TaskState};
use tasksched_test_utils::recorder::Recorder;

#[test]
fn test_push_first_remove() {
    let sched = new_sched();
    let a = Task::barrier(&sched).unwrap();
    let b = Task::barrier(&sched).unwrap();

    let mut list = TaskList::new();
    assert!(list.first().is_none());

    list.push(&a).unwrap();
    list.push(&b).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.first(), Some(&a));

    assert!(list.remove(&a));
    assert!(!list.remove(&a));
    assert_eq!(list.first(), Some(&b));
    assert_eq!(list.iter().count(), 1);
}

#[test]
fn test_task_belongs_to_one_list_at_a_time() {
    let sched = new_sched();
    let a = Task::barrier(&sched).unwrap();

    let mut first = TaskList::new();
    let mut second = TaskList::new();
    first.push(&a).unwrap();

    let err = second.push(&a).unwrap_err();
    assert!(matches!(err, SchedError::PermissionDenied(_)), "got {err:?}");
    let err = first.push(&a).unwrap_err();
    assert!(matches!(err, SchedError::PermissionDenied(_)), "got {err:?}");

    first.remove(&a);
    second.push(&a).unwrap();

    // Dropping a list frees its members for another one.
    drop(second);
    first.push(&a).unwrap();
}

#[test]
fn test_schedule_all_empties_the_list() {
    let sched = new_sched();
    let rec = Recorder::new();

    let mut list = TaskList::new();
    for name in ["a", "b", "c"] {
        list.push(&completing_task(&sched, &rec, name, 0)).unwrap();
    }

    list.schedule_all(true).unwrap();

    assert!(list.is_empty());
    assert_eq!(rec.events(), vec!["a", "b", "c"]);
    assert!(sched.check_complete());
}

#[test]
fn test_schedule_all_reports_first_error_but_schedules_the_rest() {
    let sched = new_sched();
    let rec = Recorder::new();

    let queued = recording_task(&sched, &rec, "queued");
    queued.schedule(false).unwrap();
    let fresh = recording_task(&sched, &rec, "fresh");

    let mut list = TaskList::new();
    list.push(&queued).unwrap();
    list.push(&fresh).unwrap();

    let err = list.schedule_all(false).unwrap_err();
    assert!(matches!(err, SchedError::PermissionDenied(_)), "got {err:?}");
    assert!(list.is_empty());

    sched.progress();
    assert_eq!(rec.count("fresh"), 1);
}

#[test]
fn test_abort_all_completes_without_running() {
    let sched = new_sched();
    let rec = Recorder::new();

    let a = completing_task(&sched, &rec, "a", 0);
    let b = completing_task(&sched, &rec, "b", 0);
    let mut list = TaskList::new();
    list.push(&a).unwrap();
    list.push(&b).unwrap();
    a.schedule(false).unwrap();

    list.abort_all(-3);

    assert!(list.is_empty());
    assert!(rec.events().is_empty());
    for t in [&a, &b] {
        assert_eq!(t.state(), TaskState::Completed);
        assert_eq!(t.result(), -3);
    }
    assert!(sched.check_complete());
}

#[test]
fn test_list_dependencies_both_directions() {
    let sched = new_sched();
    let rec = Recorder::new();

    let gate = Task::barrier(&sched).unwrap();
    let mut members = TaskList::new();
    let a = completing_task(&sched, &rec, "a", 0);
    let b = completing_task(&sched, &rec, "b", 0);
    members.push(&a).unwrap();
    members.push(&b).unwrap();

    // 1. Every member waits on the gate.
    members.depend_on(&gate).unwrap();
    assert_eq!(a.dependency_count(), 1);
    assert_eq!(b.dependency_count(), 1);

    // 2. The join waits on every member.
    let join = completing_task(&sched, &rec, "join", 0);
    join.depend_on_list(&members).unwrap();
    assert_eq!(join.dependency_count(), 2);

    join.schedule(false).unwrap();
    members.schedule_all(false).unwrap();
    sched.progress();
    assert!(rec.events().is_empty());

    gate.complete(0);
    sched.progress();
    assert_eq!(rec.events(), vec!["a", "b", "join"]);
}

#[test]
fn test_traverse_returns_last_non_zero() {
    let sched = new_sched();
    let mut list = TaskList::new();
    let tasks: Vec<Task> = (0..4).map(|_| Task::barrier(&sched).unwrap()).collect();
    for t in &tasks {
        list.push(t).unwrap();
    }

    let mut seen = 0;
    let rc = list.traverse(|t| {
        seen += 1;
        if *t == tasks[1] {
            2
        } else if *t == tasks[2] {
            5
        } else {
            0
        }
    });

    assert_eq!(seen, 4);
    assert_eq!(rc, 5);
}

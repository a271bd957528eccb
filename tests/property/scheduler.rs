use std::collections::BTreeSet;

use proptest::prelude::*;
use tasksched::{Scheduler, Task, TaskState};
use tasksched_test_utils::recorder::Recorder;

const CANCELLED: i32 = -125;

/// One node of a generated graph.
#[derive(Debug, Clone)]
struct Node {
    deps: BTreeSet<usize>,
    result: i32,
}

// Acyclic by construction: node N may only depend on nodes 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Node>> {
    (1..=max_tasks).prop_flat_map(|n| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..n),
                prop_oneof![4 => Just(0), 1 => Just(1), 1 => Just(-7)],
            ),
            n,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (potential, result))| Node {
                    deps: if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    },
                    result,
                })
                .collect::<Vec<_>>()
        })
    })
}

/// A graph plus the order its nodes are handed to the scheduler.
fn dag_and_order(max_tasks: usize) -> impl Strategy<Value = (Vec<Node>, Vec<usize>)> {
    dag_strategy(max_tasks).prop_flat_map(|nodes| {
        let order: Vec<usize> = (0..nodes.len()).collect();
        (Just(nodes), Just(order).prop_shuffle())
    })
}

fn build(sched: &Scheduler, rec: &Recorder, nodes: &[Node], hang: &BTreeSet<usize>) -> Vec<Task> {
    let tasks: Vec<Task> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let name = i.to_string();
            if hang.contains(&i) {
                Task::with_body(sched, rec.recording_body(&name)).unwrap()
            } else {
                Task::with_body(sched, rec.completing_body(&name, node.result)).unwrap()
            }
        })
        .collect();

    for (i, node) in nodes.iter().enumerate() {
        for &dep in &node.deps {
            tasks[i].add_dependency(&tasks[dep]).unwrap();
        }
    }
    tasks
}

/// Whether node `i` or anything it transitively waits on fails.
fn sees_failure(nodes: &[Node], i: usize) -> bool {
    nodes[i].result != 0 || nodes[i].deps.iter().any(|&d| sees_failure(nodes, d))
}

proptest! {
    #[test]
    fn test_dependency_order_is_respected((nodes, order) in dag_and_order(10)) {
        let sched = Scheduler::init(None, None).unwrap();
        let rec = Recorder::new();
        let tasks = build(&sched, &rec, &nodes, &BTreeSet::new());

        for &i in &order {
            tasks[i].schedule(false).unwrap();
        }
        for _ in 0..=nodes.len() {
            if sched.check_complete() {
                break;
            }
            sched.progress();
        }

        prop_assert!(sched.check_complete());
        prop_assert_eq!(sched.inflight(), 0);
        prop_assert_eq!(rec.events().len(), nodes.len());

        for (i, node) in nodes.iter().enumerate() {
            let name = i.to_string();
            prop_assert_eq!(rec.count(&name), 1, "task {} ran more than once", i);
            prop_assert_eq!(tasks[i].state(), TaskState::Completed);

            let pos = rec.position(&name).unwrap();
            for &dep in &node.deps {
                let dep_pos = rec.position(&dep.to_string()).unwrap();
                prop_assert!(dep_pos < pos, "task {} ran before its dependency {}", i, dep);
            }
        }
    }

    #[test]
    fn test_failures_propagate_to_dependents((nodes, order) in dag_and_order(8)) {
        let sched = Scheduler::init(None, None).unwrap();
        let rec = Recorder::new();
        let tasks = build(&sched, &rec, &nodes, &BTreeSet::new());

        for &i in &order {
            tasks[i].schedule(false).unwrap();
        }
        sched.progress();

        for i in 0..nodes.len() {
            if sees_failure(&nodes, i) {
                prop_assert_ne!(tasks[i].result(), 0, "task {} hid a failure", i);
            } else {
                prop_assert_eq!(tasks[i].result(), 0);
            }
        }

        let any_failed = nodes.iter().any(|n| n.result != 0);
        prop_assert_eq!(sched.result() != 0, any_failed);
    }

    #[test]
    fn test_cancellation_terminates(
        (nodes, order) in dag_and_order(10),
        hang in proptest::collection::btree_set(0..10usize, 0..5),
    ) {
        let sched = Scheduler::init(None, None).unwrap();
        let rec = Recorder::new();
        let tasks = build(&sched, &rec, &nodes, &hang);

        for &i in &order {
            tasks[i].schedule(false).unwrap();
        }
        sched.progress();
        sched.complete(CANCELLED, true);

        prop_assert!(sched.is_finalized());
        prop_assert_eq!(sched.inflight(), 0);
        for (i, task) in tasks.iter().enumerate() {
            prop_assert!(task.is_completed(), "task {} left uncompleted", i);
        }
    }
}

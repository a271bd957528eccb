// src/sched/mod.rs

//! Scheduler handle, its locked state and the drive loop.
//!
//! - [`scheduler`] is the public, cloneable [`Scheduler`] handle.
//! - [`state`] holds everything mutated under the scheduler lock: the task
//!   arena, the init / sleeping / running / complete collections, inflight
//!   and reference counts.
//! - [`drive`] runs the passes that promote, start and post-process tasks.

mod drive;
pub mod scheduler;
pub(crate) mod state;

pub use scheduler::{SchedCallback, Scheduler, SchedulerOptions};

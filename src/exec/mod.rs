// src/exec/mod.rs

//! Pipeline runner on top of the engine.
//!
//! - [`pipeline`] builds a scheduler and its tasks from a validated
//!   pipeline file and reports on them afterwards.
//! - [`driver`] ticks the scheduler on a tokio interval until it is done,
//!   cancelling it after an optional deadline.

pub mod driver;
pub mod pipeline;

pub use driver::{DriveOptions, DriveOutcome, drive};
pub use pipeline::{Pipeline, PipelineReport, TaskReport, attempts};

// src/lib.rs

//! Node-local asynchronous task scheduling engine.
//!
//! The engine is made of [`Task`]s owned by a [`Scheduler`]. Tasks wait on
//! each other through dependencies, run prep callbacks before their body and
//! completion callbacks before they are marked done, and may be re-armed
//! (`reinit`) to run again without being reallocated. Nothing runs on its
//! own: the owner calls [`Scheduler::progress`] to drive tasks forward.
//!
//! The `tasksched` binary wraps the engine in a small pipeline runner: it
//! loads a TOML task graph (see [`config`]), builds engine tasks from it and
//! drives the scheduler on a tokio interval (see [`exec`]).

pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod sched;
mod sync;
pub mod task;
pub mod types;

pub use clock::{Clock, MockClock, MonotonicClock};
pub use errors::{Result as SchedResult, SchedError};
pub use sched::{SchedCallback, Scheduler, SchedulerOptions};
pub use task::{Task, TaskBody, TaskList};
pub use types::{DEFAULT_SCRATCH_CAPACITY, ResultCode, TaskId, TaskState, UserData};

use std::time::Duration;

use anyhow::{Result, bail};
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::PipelineFile;
use crate::config::validate::topological_order;
use crate::exec::{DriveOptions, Pipeline, drive};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the pipeline, builds it, drives the scheduler to
/// completion and prints the per-task report.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let mut options = DriveOptions::from_section(&cfg.scheduler);
    if let Some(ms) = args.cancel_after_ms {
        options.cancel_after = Some(Duration::from_millis(ms));
    }

    let pipeline = Pipeline::build(&cfg, tokio::runtime::Handle::current())?;
    pipeline.schedule()?;

    let outcome = drive(pipeline.scheduler(), &options).await;
    let report = pipeline.report();
    print!("{report}");

    if outcome.cancelled {
        bail!("pipeline cancelled after {} ticks", outcome.ticks);
    }
    if outcome.result != 0 {
        bail!("pipeline finished with result {}", outcome.result);
    }
    Ok(())
}

/// Print the validated task graph without running it.
fn print_dry_run(cfg: &PipelineFile) {
    println!("tasksched dry-run");
    println!(
        "  scheduler.scratch_capacity = {}",
        cfg.scheduler.scratch_capacity
    );
    println!("  scheduler.tick_ms = {}", cfg.scheduler.tick_ms);
    if let Some(ms) = cfg.scheduler.cancel_after_ms {
        println!("  scheduler.cancel_after_ms = {ms}");
    }
    println!();

    println!("tasks ({}), in dependency order:", cfg.task.len());
    for name in topological_order(cfg) {
        let Some(task) = cfg.task.get(&name) else {
            continue;
        };
        println!("  - {name}");
        if task.barrier {
            println!("      barrier: true");
        } else {
            println!("      result: {}", task.result);
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if task.delay_ms != 0 {
            println!("      delay_ms: {}", task.delay_ms);
        }
        if task.latency_ms != 0 {
            println!("      latency_ms: {}", task.latency_ms);
        }
        if task.retries != 0 {
            println!("      retries: {}", task.retries);
        }
        if task.no_propagate {
            println!("      no_propagate: true");
        }
        if task.instant {
            println!("      instant: true");
        }
    }

    debug!("dry-run complete (no execution)");
}

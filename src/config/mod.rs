// src/config/mod.rs

//! Pipeline configuration for the `tasksched` runner.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading pipeline files from disk.
//! - `validate.rs`: option sanity and graph checks (unknown deps, cycles).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{PipelineFile, RawPipelineFile, SchedulerSection, TaskSpec};
pub use validate::topological_order;

// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::{Result, SchedError};

/// Smallest scratch capacity that still fits one aligned slot.
const MIN_SCRATCH_CAPACITY: usize = 8;

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = SchedError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;
        Ok(PipelineFile::new_unchecked(raw.scheduler, raw.task))
    }
}

fn validate_raw_pipeline(cfg: &RawPipelineFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_scheduler_section(cfg)?;
    validate_task_options(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(SchedError::ConfigError(
            "pipeline must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler_section(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.scheduler.scratch_capacity < MIN_SCRATCH_CAPACITY {
        return Err(SchedError::ConfigError(format!(
            "[scheduler].scratch_capacity must be >= {MIN_SCRATCH_CAPACITY} (got {})",
            cfg.scheduler.scratch_capacity
        )));
    }
    if cfg.scheduler.tick_ms == 0 {
        return Err(SchedError::ConfigError(
            "[scheduler].tick_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_options(cfg: &RawPipelineFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.barrier {
            let conflicting = [
                ("retries", task.retries != 0),
                ("latency_ms", task.latency_ms != 0),
                ("instant", task.instant),
                ("result", task.result != 0),
            ];
            if let Some((field, _)) = conflicting.iter().find(|(_, set)| *set) {
                return Err(SchedError::ConfigError(format!(
                    "barrier task '{name}' cannot set `{field}`"
                )));
            }
        }
        if task.instant && task.delay_ms != 0 {
            return Err(SchedError::ConfigError(format!(
                "task '{name}' cannot be both `instant` and delayed"
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawPipelineFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(SchedError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(SchedError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawPipelineFile) -> Result<()> {
    // Edge direction: dep -> task, so `after = ["A"]` on B adds A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(SchedError::GraphCycle(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}

/// Task names in an order where every task follows all of its `after`.
pub fn topological_order(cfg: &PipelineFile) -> Vec<String> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // Validated pipelines are acyclic; fall back to name order otherwise.
    match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(str::to_string).collect(),
        Err(_) => cfg.task.keys().cloned().collect(),
    }
}

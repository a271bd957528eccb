// src/errors.rs

//! Crate-wide error type and result alias.

use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient scratch space: requested {requested} bytes, {available} available")]
    InsufficientScratch { requested: usize, available: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in task graph: {0}")]
    GraphCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<TryReserveError> for SchedError {
    fn from(err: TryReserveError) -> Self {
        SchedError::OutOfMemory(err.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedError>;

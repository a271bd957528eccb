// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::Result;

/// Read and deserialize a pipeline file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawPipelineFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Parse a pipeline from a TOML string and validate it.
pub fn parse_and_validate(contents: &str) -> Result<PipelineFile> {
    let raw: RawPipelineFile = toml::from_str(contents)?;
    PipelineFile::try_from(raw)
}

/// Load a pipeline file and validate it.
///
/// Checks unknown and self `after` references, dependency cycles, option
/// combinations that make no sense for a task, and `[scheduler]` sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineFile> {
    let raw = load_from_path(&path)?;
    PipelineFile::try_from(raw)
}

/// `Pipeline.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Pipeline.toml")
}

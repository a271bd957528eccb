// src/logging.rs

//! Logging setup for the `tasksched` runner.
//!
//! The engine logs under the `tasksched` target: per-task transitions at
//! `trace`, scheduler lifecycle at `debug`, anomalies such as finalizing a
//! scheduler that still holds tasks at `warn`. The filter is picked as:
//!
//! 1. `--log-level` on the CLI, applied to `tasksched` targets only;
//! 2. `TASKSCHED_LOG`, taken as a full `EnvFilter` directive string
//!    (`debug`, `tasksched::sched=trace,tokio=warn`, ...);
//! 3. [`DEFAULT_DIRECTIVES`].
//!
//! Logs go to STDERR; the run report is printed on STDOUT.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "TASKSCHED_LOG";

/// Target prefix of every engine and runner event.
const TARGET: &str = "tasksched";

pub const DEFAULT_DIRECTIVES: &str = "tasksched=info";

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let directives = filter_directives(cli_level, env.as_deref());

    let filter = match EnvFilter::try_new(&directives) {
        Ok(filter) => filter,
        Err(err) => {
            eprintln!("tasksched: ignoring {LOG_ENV_VAR}={directives:?}: {err}");
            EnvFilter::new(DEFAULT_DIRECTIVES)
        }
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("failed to install log subscriber")?;

    Ok(())
}

/// Directive string for the subscriber filter.
pub fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    if let Some(lvl) = cli_level {
        return format!("{TARGET}={}", level_name(lvl));
    }
    match env.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => DEFAULT_DIRECTIVES.to_string(),
    }
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

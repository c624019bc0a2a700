use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("no build toolchain found (searched: {searched})")]
    ToolchainNotFound { searched: String },
}

impl ConfigError {
    pub(crate) fn toolchain_not_found(candidates: &[PathBuf]) -> Self {
        let searched = if candidates.is_empty() {
            "<no candidates configured>".to_string()
        } else {
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Self::ToolchainNotFound { searched }
    }
}

/// Conditions that end a run without every task being accounted for.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler stalled: {pending} task(s) pending with nothing running or admissible")]
    Stalled { pending: usize },
    #[error("worker pool closed with {in_flight} task(s) still in flight")]
    PoolClosed { in_flight: usize },
}

/// Anything that ends a run before or outside of task execution.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("cannot open events output: {0}")]
    EventsOut(#[source] std::io::Error),
}

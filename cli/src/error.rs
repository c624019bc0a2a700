use mpbuild_core::{ConfigError, JobError, RunError, SchedulerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("cannot open events output: {0}")]
    EventsOut(#[source] std::io::Error),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<RunError> for CliError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Config(e) => CliError::Config(e),
            RunError::Scheduler(e) => CliError::Scheduler(e),
            RunError::EventsOut(e) => CliError::EventsOut(e),
        }
    }
}

impl CliError {
    // 0: success
    // 1: a build failed (returned as a normal exit code, not an error)
    // 11: config error
    // 12: job document error
    // 50: internal/uncategorized
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Logging(_) => 11,
            CliError::Job(_) => 12,
            CliError::Scheduler(_) | CliError::EventsOut(_) | CliError::Io(_) | CliError::Anyhow(_) => 50,
        }
    }
}

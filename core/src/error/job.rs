use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading and validating a job document.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("cannot read job file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid job document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("task at position {position} declares id {id}")]
    IdMismatch { position: usize, id: usize },

    #[error("Dependency not found: task {task_id} depends on {missing_dep}")]
    DependencyNotFound { task_id: usize, missing_dep: usize },

    #[error("task {0} depends on itself")]
    SelfDependency(usize),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),
}

//! Job documents and the task graph built from them.
//!
//! ```text
//! job.json
//!   ↓
//! JobDocument { platform, tasks: Vec<TaskSpec> }
//!   ↓
//! TaskGraph::new() → id / dependency checks, topological validation
//!   ↓
//! Job { platform, graph }
//! ```

mod graph;
mod task;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Platform;
use crate::error::JobError;

pub use graph::TaskGraph;
pub use task::{RunState, Task, TaskSpec};

/// On-disk shape of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub tasks: Vec<TaskSpec>,
}

/// A validated job, owning every task for the duration of one run.
#[derive(Debug)]
pub struct Job {
    pub platform: Option<Platform>,
    pub graph: TaskGraph,
}

impl Job {
    pub fn from_document(doc: JobDocument) -> Result<Self, JobError> {
        Ok(Self {
            platform: doc.platform,
            graph: TaskGraph::new(doc.tasks)?,
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self, JobError> {
        let doc: JobDocument = serde_json::from_str(s)?;
        Self::from_document(doc)
    }

    pub fn load(path: &Path) -> Result<Self, JobError> {
        let s = std::fs::read_to_string(path).map_err(|source| JobError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let job = Self::from_json_str(&s)?;
        tracing::debug!(path = %path.display(), tasks = job.graph.len(), "job loaded");
        Ok(job)
    }

    /// Platform tag of the document, or the configured default.
    pub fn platform_or(&self, default: Platform) -> Platform {
        self.platform.unwrap_or(default)
    }
}

use thiserror::Error;

/// Why a single build task failed. Recorded on the task and reported in its
/// completion; never affects other tasks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("exit status {}", display_code(.code))]
    Exit { code: Option<i32> },

    #[error("stuck task killed (inactivity score {score:.1})")]
    Stuck { score: f64 },

    #[error("io error: {0}")]
    Io(String),
}

impl TaskError {
    pub fn is_stuck(&self) -> bool {
        matches!(self, Self::Stuck { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "unknown (terminated by signal)".to_string(),
    }
}

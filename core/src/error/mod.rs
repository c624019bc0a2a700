#[allow(clippy::module_inception)]
pub mod error;
pub mod job;
pub mod task;

pub use error::{ConfigError, RunError, SchedulerError};
pub use job::JobError;
pub use task::TaskError;

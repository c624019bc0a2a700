//! Turning tasks into build processes.

mod command;
mod io_pump;
mod runner;

pub use command::{BuildCommand, BuildSettings, CommandPlanner};
pub use io_pump::{CaptureBuffer, LineStream};
pub use runner::{run_command, BuildOutcome, BuildRunner, ProcessBuildRunner};

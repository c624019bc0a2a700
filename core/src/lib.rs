pub mod aggregator;
pub mod build;
pub mod config;
pub mod error;
pub mod events_out;
pub mod job;
pub mod pool;
pub mod progress;
pub mod scheduler;
pub mod toolchain;
pub mod watchdog;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use aggregator::ResultAggregator;
pub use build::{BuildOutcome, BuildRunner, CommandPlanner, ProcessBuildRunner};
pub use config::{AppConfig, Platform};
pub use error::{ConfigError, JobError, RunError, SchedulerError, TaskError};
pub use job::{Job, RunState, Task, TaskGraph, TaskSpec};
pub use pool::{OutputChunk, TaskCompletion, WorkerPool};
pub use scheduler::{FailurePolicy, RunOptions, RunSummary, Scheduler, TaskFailure};

/// Build a process runner for `platform` from configuration. Resolves the
/// toolchain, so a missing msbuild driver fails here.
pub fn process_runner(platform: Platform, cfg: &AppConfig) -> Result<ProcessBuildRunner, ConfigError> {
    let settings = build::BuildSettings::from_config(cfg);
    let locator = toolchain::PathListLocator::from_config(&cfg.msbuild);
    let planner = CommandPlanner::new(platform, settings, &locator)?;
    Ok(ProcessBuildRunner::from_config(planner, cfg))
}

/// Run `graph` with external build processes, printing captured output to
/// stdout and writing events if configured.
pub async fn run_graph(
    graph: Arc<TaskGraph>,
    platform: Platform,
    cfg: &AppConfig,
) -> Result<RunSummary, RunError> {
    let runner = process_runner(platform, cfg)?;
    run_with_runner(graph, Arc::new(runner), platform, cfg).await
}

pub async fn run_with_runner(
    graph: Arc<TaskGraph>,
    runner: Arc<dyn BuildRunner>,
    platform: Platform,
    cfg: &AppConfig,
) -> Result<RunSummary, RunError> {
    let events = events_out::start_events_out(&cfg.events_out)
        .await
        .map_err(RunError::EventsOut)?;

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let aggregator = ResultAggregator::stdout(&cfg.output).spawn(output_rx);

    let result = Scheduler::new(graph, runner, RunOptions::from_config(cfg))
        .with_events(events.as_ref().map(|e| e.tx().clone()))
        .with_platform(platform)
        .run(output_tx)
        .await;

    if let Err(e) = aggregator.await {
        tracing::warn!(error = %e, "output aggregator failed");
    }
    if let Some(events) = events {
        events.finish().await;
    }

    Ok(result?)
}

//! Admission and dispatch control loop.
//!
//! The scheduler alone moves tasks from Pending to Running. Each iteration
//! admits every ready task the exclusivity rules allow, then blocks for at
//! least one completion and drains whatever else has already arrived.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::build::BuildRunner;
use crate::config::AppConfig;
use crate::error::{SchedulerError, TaskError};
use crate::events_out::{write_event, EventsOutTx, RunEvent, TaskStatus};
use crate::job::TaskGraph;
use crate::pool::{OutputChunk, TaskCompletion, WorkerPool};
use crate::progress::ProgressMonitor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop admitting after the first failure; in-flight tasks finish.
    #[default]
    StopOnError,
    /// Keep going; a failed task counts as completed for its dependents.
    ContinueOnError,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub failure_policy: FailurePolicy,
    /// Upper bound on one wait for results; `None` waits indefinitely.
    pub drain_deadline: Option<Duration>,
    pub progress_bar: bool,
}

impl RunOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            workers: cfg.workers.max(1),
            failure_policy: if cfg.continue_on_error {
                FailurePolicy::ContinueOnError
            } else {
                FailurePolicy::StopOnError
            },
            drain_deadline: cfg.scheduler.drain_deadline_ms.map(Duration::from_millis),
            progress_bar: cfg.output.progress_bar,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Admitting,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerPhase::Idle => "idle",
            SchedulerPhase::Admitting => "admitting",
            SchedulerPhase::Draining => "draining",
            SchedulerPhase::Done => "done",
            SchedulerPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{label} failed: {error}")]
pub struct TaskFailure {
    pub task_id: usize,
    pub label: String,
    pub error: TaskError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Tasks left pending after a stop-on-error run.
    pub not_run: usize,
    pub elapsed: Duration,
    pub first_failure: Option<TaskFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.first_failure.is_none()
    }

    /// The run's reported error is the first failure in completion order.
    pub fn into_result(self) -> Result<RunSummary, TaskFailure> {
        match self.first_failure.clone() {
            Some(failure) => Err(failure),
            None => Ok(self),
        }
    }
}

/// Drives one run of a task graph over a worker pool.
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    runner: Arc<dyn BuildRunner>,
    options: RunOptions,
    events: Option<EventsOutTx>,
    run_id: String,
    platform: String,
}

impl Scheduler {
    pub fn new(graph: Arc<TaskGraph>, runner: Arc<dyn BuildRunner>, options: RunOptions) -> Self {
        Self {
            graph,
            runner,
            options,
            events: None,
            run_id: uuid::Uuid::new_v4().to_string(),
            platform: String::new(),
        }
    }

    pub fn with_events(mut self, events: Option<EventsOutTx>) -> Self {
        self.events = events;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Platform name reported in the `run.start` event.
    pub fn with_platform(mut self, platform: impl fmt::Display) -> Self {
        self.platform = platform.to_string();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run until every task is completed, or until the failure policy ends
    /// the run and nothing is left in flight. Captured output goes to
    /// `output_tx`.
    pub async fn run(
        self,
        output_tx: mpsc::UnboundedSender<OutputChunk>,
    ) -> Result<RunSummary, SchedulerError> {
        let started = Instant::now();
        let total = self.graph.len();

        let ignored = self.graph.skip_ignored();
        let skipped = self.graph.skipped_count();
        tracing::info!(
            run_id = %self.run_id,
            total,
            skipped,
            ignored,
            workers = self.options.workers,
            "run started"
        );
        write_event(
            self.events.as_ref(),
            &RunEvent::RunStart {
                run_id: self.run_id.clone(),
                ts: RunEvent::now(),
                total,
                skipped,
                workers: self.options.workers,
                platform: self.platform.clone(),
            },
        )
        .await;

        let mut progress = ProgressMonitor::new(total, self.options.progress_bar);
        for _ in 0..skipped {
            progress.skip_task();
        }

        let (results_tx, mut results_rx) = mpsc::channel::<TaskCompletion>(total.max(1));
        let pool = WorkerPool::spawn(
            self.options.workers,
            self.graph.clone(),
            self.runner.clone(),
            results_tx,
            output_tx,
        );

        let mut run = LoopState {
            phase: SchedulerPhase::Idle,
            running: 0,
            alone_running: false,
            cost_in_flight: 0,
            completed: self.graph.completed_count(),
            succeeded: 0,
            failed: 0,
            stopping: false,
            first_failure: None,
        };

        let outcome = loop {
            if !run.stopping {
                run.set_phase(SchedulerPhase::Admitting);
                if let Err(e) = self.admit(&pool, &mut run, &mut progress).await {
                    break Err(e);
                }
            }

            if run.running == 0 {
                if run.completed == total {
                    run.set_phase(SchedulerPhase::Done);
                    break Ok(());
                }
                if run.stopping {
                    run.set_phase(SchedulerPhase::Failed);
                    break Ok(());
                }
                let pending = total - run.completed;
                tracing::error!(pending, "nothing running and nothing admissible");
                break Err(SchedulerError::Stalled { pending });
            }

            run.set_phase(SchedulerPhase::Draining);
            let first = match self.options.drain_deadline {
                Some(deadline) => match tokio::time::timeout(deadline, results_rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::debug!(in_flight = run.running, "drain deadline elapsed");
                        continue;
                    }
                },
                None => results_rx.recv().await,
            };
            let Some(first) = first else {
                break Err(SchedulerError::PoolClosed {
                    in_flight: run.running,
                });
            };
            self.complete(first, &mut run, &mut progress, total).await;
            while let Ok(next) = results_rx.try_recv() {
                self.complete(next, &mut run, &mut progress, total).await;
            }
        };

        pool.shutdown().await;
        progress.finish(outcome.is_ok() && run.first_failure.is_none());
        outcome?;

        let skipped = self.graph.skipped_count();
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            total,
            succeeded: run.succeeded,
            failed: run.failed,
            skipped,
            not_run: total - run.succeeded - run.failed - skipped,
            elapsed: started.elapsed(),
            first_failure: run.first_failure,
        };

        tracing::info!(
            run_id = %summary.run_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            not_run = summary.not_run,
            elapsed = %format_elapsed(summary.elapsed),
            "run finished"
        );
        write_event(
            self.events.as_ref(),
            &RunEvent::RunEnd {
                run_id: summary.run_id.clone(),
                ts: RunEvent::now(),
                succeeded: summary.succeeded,
                failed: summary.failed,
                skipped: summary.skipped,
                elapsed_ms: summary.elapsed.as_millis() as u64,
                ok: summary.is_success(),
            },
        )
        .await;

        Ok(summary)
    }

    /// One admission pass over the ready tasks, in id order.
    async fn admit(
        &self,
        pool: &WorkerPool,
        run: &mut LoopState,
        progress: &mut ProgressMonitor,
    ) -> Result<(), SchedulerError> {
        for id in self.graph.ready_tasks() {
            if run.alone_running {
                break;
            }
            let Some(task) = self.graph.task(id) else {
                continue;
            };
            let alone = task.spec().alone;
            if alone && run.running > 0 {
                continue;
            }
            if !task.start() {
                continue;
            }

            run.running += 1;
            run.alone_running = alone;
            run.cost_in_flight += task.spec().cost;
            pool.dispatch(id).map_err(|_| SchedulerError::PoolClosed {
                in_flight: run.running,
            })?;

            tracing::debug!(
                task_id = id,
                label = %task.label(),
                alone,
                cost_in_flight = run.cost_in_flight,
                "task admitted"
            );
            progress.start_task(id, task.label());
            write_event(
                self.events.as_ref(),
                &RunEvent::TaskStart {
                    run_id: self.run_id.clone(),
                    ts: RunEvent::now(),
                    task_id: id,
                    label: task.label().to_string(),
                    alone,
                    cost_in_flight: run.cost_in_flight,
                },
            )
            .await;
        }
        Ok(())
    }

    async fn complete(
        &self,
        completion: TaskCompletion,
        run: &mut LoopState,
        progress: &mut ProgressMonitor,
        total: usize,
    ) {
        let TaskCompletion {
            task_id,
            worker,
            result,
            elapsed,
        } = completion;
        let (label, alone, cost) = match self.graph.task(task_id) {
            Some(task) => (task.label().to_string(), task.spec().alone, task.spec().cost),
            None => (format!("#{task_id}"), false, 0),
        };

        run.running = run.running.saturating_sub(1);
        if alone {
            run.alone_running = false;
        }
        run.cost_in_flight -= cost;
        run.completed += 1;

        let (status, error) = match &result {
            Ok(()) => {
                run.succeeded += 1;
                tracing::info!(
                    task_id,
                    worker,
                    "->Done {} ({}/{}, cost:{}, time:{})",
                    label,
                    run.completed,
                    total,
                    run.cost_in_flight,
                    format_elapsed(elapsed)
                );
                (TaskStatus::Succeeded, None)
            }
            Err(err) => {
                run.failed += 1;
                tracing::error!(task_id, worker, "Error {} ({})", label, err);
                if run.first_failure.is_none() {
                    run.first_failure = Some(TaskFailure {
                        task_id,
                        label: label.clone(),
                        error: err.clone(),
                    });
                }
                if self.options.failure_policy == FailurePolicy::StopOnError && !run.stopping {
                    run.stopping = true;
                    tracing::warn!(in_flight = run.running, "stopping after failure; waiting for in-flight builds");
                }
                (TaskStatus::Failed, Some(err.to_string()))
            }
        };

        progress.complete_task(task_id, result.is_ok(), elapsed);
        progress.set_message(&format!("cost in flight: {}", run.cost_in_flight));
        write_event(
            self.events.as_ref(),
            &RunEvent::TaskEnd {
                run_id: self.run_id.clone(),
                ts: RunEvent::now(),
                task_id,
                label,
                status,
                error,
                elapsed_ms: elapsed.as_millis() as u64,
                completed: run.completed,
                total,
                cost_in_flight: run.cost_in_flight,
            },
        )
        .await;
    }
}

struct LoopState {
    phase: SchedulerPhase,
    running: usize,
    alone_running: bool,
    cost_in_flight: i64,
    completed: usize,
    succeeded: usize,
    failed: usize,
    stopping: bool,
    first_failure: Option<TaskFailure>,
}

impl LoopState {
    fn set_phase(&mut self, next: SchedulerPhase) {
        if self.phase != next {
            tracing::debug!(from = %self.phase, to = %next, "scheduler phase");
            self.phase = next;
        }
    }
}

/// `12.3s` below a minute, `4m05s` above.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.workers = 0;
        cfg.continue_on_error = true;
        cfg.scheduler.drain_deadline_ms = Some(250);

        let opts = RunOptions::from_config(&cfg);
        assert_eq!(opts.workers, 1);
        assert_eq!(opts.failure_policy, FailurePolicy::ContinueOnError);
        assert_eq!(opts.drain_deadline, Some(Duration::from_millis(250)));
        assert_eq!(RunOptions::default().failure_policy, FailurePolicy::StopOnError);
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(12_345)), "12.3s");
        assert_eq!(format_elapsed(Duration::from_secs(245)), "4m05s");
    }

    #[test]
    fn summary_reports_first_failure() {
        let failure = TaskFailure {
            task_id: 1,
            label: "Core".into(),
            error: TaskError::Exit { code: Some(1) },
        };
        let summary = RunSummary {
            run_id: "r".into(),
            total: 2,
            succeeded: 1,
            failed: 1,
            skipped: 0,
            not_run: 0,
            elapsed: Duration::ZERO,
            first_failure: Some(failure.clone()),
        };
        assert!(!summary.is_success());
        assert_eq!(summary.into_result().unwrap_err(), failure);
        assert_eq!(failure.to_string(), "Core failed: exit status 1");
    }
}

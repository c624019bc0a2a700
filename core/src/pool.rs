use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::build::{BuildOutcome, BuildRunner};
use crate::error::{SchedulerError, TaskError};
use crate::job::TaskGraph;

/// Sent by a worker once a task has reached a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCompletion {
    pub task_id: usize,
    pub worker: usize,
    pub result: Result<(), TaskError>,
    pub elapsed: Duration,
}

/// Captured build output of one task, forwarded to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub task_id: usize,
    pub label: String,
    pub text: String,
}

/// Fixed set of workers pulling task ids from a shared ready queue.
pub struct WorkerPool {
    ready_tx: mpsc::Sender<usize>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `size` workers. The ready queue holds every task of the graph so
    /// dispatching never waits.
    pub fn spawn(
        size: usize,
        graph: Arc<TaskGraph>,
        runner: Arc<dyn BuildRunner>,
        results_tx: mpsc::Sender<TaskCompletion>,
        output_tx: mpsc::UnboundedSender<OutputChunk>,
    ) -> Self {
        let (ready_tx, ready_rx) = mpsc::channel::<usize>(graph.len().max(1));
        let ready_rx = Arc::new(Mutex::new(ready_rx));

        let workers = (0..size.max(1))
            .map(|worker| {
                let ctx = WorkerCtx {
                    worker,
                    graph: graph.clone(),
                    runner: runner.clone(),
                    ready_rx: ready_rx.clone(),
                    results_tx: results_tx.clone(),
                    output_tx: output_tx.clone(),
                };
                tokio::spawn(worker_loop(ctx))
            })
            .collect();

        Self { ready_tx, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task id that the caller has already moved to Running.
    pub fn dispatch(&self, task_id: usize) -> Result<(), SchedulerError> {
        self.ready_tx.try_send(task_id).map_err(|e| {
            tracing::error!(task_id, error = %e, "ready queue rejected task");
            SchedulerError::PoolClosed { in_flight: 1 }
        })
    }

    /// Close the ready queue and wait for every worker to exit.
    pub async fn shutdown(self) {
        drop(self.ready_tx);
        let joined = futures::future::join_all(self.workers).await;
        for (worker, res) in joined.into_iter().enumerate() {
            if let Err(e) = res {
                tracing::warn!(worker, error = %e, "worker exited abnormally");
            }
        }
    }
}

struct WorkerCtx {
    worker: usize,
    graph: Arc<TaskGraph>,
    runner: Arc<dyn BuildRunner>,
    ready_rx: Arc<Mutex<mpsc::Receiver<usize>>>,
    results_tx: mpsc::Sender<TaskCompletion>,
    output_tx: mpsc::UnboundedSender<OutputChunk>,
}

async fn worker_loop(ctx: WorkerCtx) {
    tracing::trace!(worker = ctx.worker, "worker started");
    loop {
        let next = {
            let mut rx = ctx.ready_rx.lock().await;
            rx.recv().await
        };
        let Some(task_id) = next else {
            break;
        };
        let Some(task) = ctx.graph.task(task_id) else {
            tracing::error!(worker = ctx.worker, task_id, "dispatched unknown task");
            continue;
        };

        tracing::debug!(worker = ctx.worker, task_id, label = %task.label(), "build started");
        let outcome = build(&ctx, task_id).await;

        task.complete(outcome.result.clone(), outcome.output.clone());

        if !outcome.output.is_empty() {
            let chunk = OutputChunk {
                task_id,
                label: task.label().to_string(),
                text: outcome.output,
            };
            if ctx.output_tx.send(chunk).is_err() {
                tracing::debug!(task_id, "output stream closed");
            }
        }

        let completion = TaskCompletion {
            task_id,
            worker: ctx.worker,
            result: outcome.result,
            elapsed: outcome.elapsed,
        };
        if ctx.results_tx.send(completion).await.is_err() {
            tracing::debug!(worker = ctx.worker, "result queue closed");
            break;
        }
    }
    tracing::trace!(worker = ctx.worker, "worker stopped");
}

/// Run the build on its own task so a panicking runner still yields a
/// completion.
async fn build(ctx: &WorkerCtx, task_id: usize) -> BuildOutcome {
    let graph = ctx.graph.clone();
    let runner = ctx.runner.clone();
    let started = std::time::Instant::now();
    let handle = tokio::spawn(async move {
        match graph.task(task_id) {
            Some(task) => runner.run(task.spec()).await,
            None => BuildOutcome::failure(
                TaskError::Spawn(format!("unknown task {task_id}")),
                String::new(),
                Duration::ZERO,
            ),
        }
    });
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => BuildOutcome::failure(
            TaskError::Io(format!("build runner aborted: {e}")),
            String::new(),
            started.elapsed(),
        ),
    }
}

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use super::command::{BuildCommand, CommandPlanner};
use super::io_pump::{pump, CaptureBuffer, LineStream};
use crate::config::{AppConfig, WatchdogConfig};
use crate::error::TaskError;
use crate::job::TaskSpec;
use crate::watchdog::{SysinfoSampler, Watchdog};

/// Pipes can outlive the build process when it leaves grandchildren behind.
const PUMP_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Result of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub result: Result<(), TaskError>,
    pub output: String,
    pub elapsed: Duration,
}

impl BuildOutcome {
    pub fn success(output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            result: Ok(()),
            output: output.into(),
            elapsed,
        }
    }

    pub fn failure(err: TaskError, output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            result: Err(err),
            output: output.into(),
            elapsed,
        }
    }
}

/// Executes the build of one task. Never fails outright; failures are
/// reported through [`BuildOutcome::result`].
#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn run(&self, task: &TaskSpec) -> BuildOutcome;
}

/// Runs tasks as external build-tool processes.
pub struct ProcessBuildRunner {
    planner: CommandPlanner,
    watchdog: Option<WatchdogConfig>,
    capture_bytes: usize,
}

impl ProcessBuildRunner {
    pub fn new(planner: CommandPlanner) -> Self {
        Self {
            planner,
            watchdog: None,
            capture_bytes: 0,
        }
    }

    pub fn from_config(planner: CommandPlanner, cfg: &AppConfig) -> Self {
        Self {
            planner,
            watchdog: cfg.watchdog.enabled.then(|| cfg.watchdog.clone()),
            capture_bytes: cfg.output.capture_bytes,
        }
    }

    pub fn with_watchdog(mut self, cfg: Option<WatchdogConfig>) -> Self {
        self.watchdog = cfg;
        self
    }

    pub fn planner(&self) -> &CommandPlanner {
        &self.planner
    }
}

#[async_trait]
impl BuildRunner for ProcessBuildRunner {
    async fn run(&self, task: &TaskSpec) -> BuildOutcome {
        let cmd = self.planner.plan(task);
        tracing::debug!(task_id = task.id, command = %cmd, "spawning build");
        run_command(&cmd, task.id, self.watchdog.as_ref(), self.capture_bytes).await
    }
}

/// Spawn `cmd`, capture its combined output, and wait for it to exit or be
/// killed by the watchdog.
pub async fn run_command(
    cmd: &BuildCommand,
    task_id: usize,
    watchdog: Option<&WatchdogConfig>,
    capture_bytes: usize,
) -> BuildOutcome {
    let started = Instant::now();

    let mut child = match Command::new(&cmd.program)
        .args(&cmd.args)
        .envs(&cmd.envs)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return BuildOutcome::failure(
                TaskError::Spawn(format!("{}: {e}", cmd.program)),
                String::new(),
                started.elapsed(),
            );
        }
    };

    let capture = CaptureBuffer::new(capture_bytes);
    let mut pumps = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        pumps.push(pump(out, LineStream::Stdout, capture.clone(), task_id));
    }
    if let Some(err) = child.stderr.take() {
        pumps.push(pump(err, LineStream::Stderr, capture.clone(), task_id));
    }

    let mut guard = match (watchdog, child.id()) {
        (Some(cfg), Some(pid)) => Some(
            Watchdog::new(cfg).spawn(SysinfoSampler::new(pid, cfg.include_children)),
        ),
        _ => None,
    };

    let result = match guard.as_mut() {
        Some(handle) => {
            tokio::select! {
                status = child.wait() => exit_result(status),
                score = handle.stalled() => {
                    tracing::warn!(task_id, score, "build stalled, killing process");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(task_id, error = %e, "failed to kill stalled build");
                    }
                    Err(TaskError::Stuck { score })
                }
            }
        }
        None => exit_result(child.wait().await),
    };
    drop(guard);

    for handle in pumps {
        let abort = handle.abort_handle();
        match tokio::time::timeout(PUMP_DRAIN_GRACE, handle).await {
            Ok(Ok(Ok(_))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(task_id, error = %e, "output pump failed"),
            Ok(Err(e)) => tracing::warn!(task_id, error = %e, "output pump panicked"),
            Err(_) => {
                tracing::warn!(task_id, "output still open after exit; detaching");
                abort.abort();
            }
        }
    }

    BuildOutcome {
        result,
        output: capture.contents(),
        elapsed: started.elapsed(),
    }
}

fn exit_result(status: std::io::Result<std::process::ExitStatus>) -> Result<(), TaskError> {
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(TaskError::Exit {
            code: status.code(),
        }),
        Err(e) => Err(TaskError::Io(format!("wait failed: {e}"))),
    }
}

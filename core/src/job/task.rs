use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Immutable description of one buildable unit, as read from the job document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Position of the task in the job.
    pub id: usize,

    #[serde(default)]
    pub cost: i64,

    #[serde(rename = "inputs", default)]
    pub dependencies: Vec<usize>,

    /// Build-artifact locator (project file path).
    #[serde(rename = "made_proj")]
    pub locator: String,

    #[serde(rename = "messages", default)]
    pub label: String,

    /// Must run with nothing else building.
    #[serde(skip)]
    pub alone: bool,

    /// Excluded from the run by configuration.
    #[serde(skip)]
    pub ignore: bool,
}

impl TaskSpec {
    pub fn new(id: usize, locator: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id,
            cost: 0,
            dependencies: Vec::new(),
            locator: locator.into(),
            label: label.into(),
            alone: false,
            ignore: false,
        }
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = usize>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_cost(mut self, cost: i64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_alone(mut self, alone: bool) -> Self {
        self.alone = alone;
        self
    }

    /// Artifact file name up to its first '.', e.g. `Foo` for `/p/Foo.xcodeproj`.
    pub fn project_name(&self) -> &str {
        let base = Path::new(&self.locator)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.locator);
        base.split('.').next().unwrap_or(base)
    }
}

/// Run state of a task. Completed = Succeeded | Failed | Skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Pending,
    Running { since: Instant },
    Succeeded,
    Failed(TaskError),
    Skipped,
}

impl RunState {
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed(_) | RunState::Skipped
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running { .. } => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed(_) => "failed",
            RunState::Skipped => "skipped",
        }
    }
}

#[derive(Debug)]
struct TaskRun {
    state: RunState,
    output: String,
    started_at: Option<DateTime<Local>>,
    elapsed: Option<Duration>,
}

/// A task inside a running job: its spec plus run state behind one lock.
#[derive(Debug)]
pub struct Task {
    spec: TaskSpec,
    run: Mutex<TaskRun>,
}

impl Task {
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            run: Mutex::new(TaskRun {
                state: RunState::Pending,
                output: String::new(),
                started_at: None,
                elapsed: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskRun> {
        match self.run.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub(crate) fn spec_mut(&mut self) -> &mut TaskSpec {
        &mut self.spec
    }

    pub fn id(&self) -> usize {
        self.spec.id
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    pub fn state(&self) -> RunState {
        self.lock().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.lock().state, RunState::Pending)
    }

    pub fn is_running(&self) -> bool {
        self.lock().state.is_running()
    }

    pub fn is_complete(&self) -> bool {
        self.lock().state.is_complete()
    }

    pub fn last_error(&self) -> Option<TaskError> {
        match &self.lock().state {
            RunState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn output(&self) -> String {
        self.lock().output.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.lock().started_at
    }

    /// Wall-clock time of the finished build, if it ran.
    pub fn elapsed(&self) -> Option<Duration> {
        self.lock().elapsed
    }

    /// Pending -> Running. Returns false for any other starting state.
    pub(crate) fn start(&self) -> bool {
        let mut run = self.lock();
        if !matches!(run.state, RunState::Pending) {
            return false;
        }
        run.state = RunState::Running {
            since: Instant::now(),
        };
        run.started_at = Some(Local::now());
        true
    }

    /// Running -> Succeeded/Failed. Only the first call has any effect.
    pub fn complete(&self, result: Result<(), TaskError>, output: String) -> bool {
        let mut run = self.lock();
        let since = match &run.state {
            RunState::Running { since } => *since,
            _ => return false,
        };
        run.elapsed = Some(since.elapsed());
        run.output = output;
        run.state = match result {
            Ok(()) => RunState::Succeeded,
            Err(err) => RunState::Failed(err),
        };
        true
    }

    /// Pending -> Skipped, without ever building.
    pub fn mark_skipped(&self) -> bool {
        let mut run = self.lock();
        if !matches!(run.state, RunState::Pending) {
            return false;
        }
        run.state = RunState::Skipped;
        true
    }
}

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mpbuild_core::{
    BuildOutcome, BuildRunner, OutputChunk, RunOptions, RunState, RunSummary, Scheduler, TaskError,
    TaskGraph, TaskSpec,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start(usize),
    End(usize),
}

/// Test runner that sleeps per task and records start/end order.
#[derive(Default)]
pub struct RecordingRunner {
    log: Mutex<Vec<Event>>,
    delays: HashMap<usize, Duration>,
    failures: HashSet<usize>,
    default_delay: Duration,
}

impl RecordingRunner {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, id: usize, delay: Duration) -> Self {
        self.delays.insert(id, delay);
        self
    }

    pub fn failing(mut self, id: usize) -> Self {
        self.failures.insert(id);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Start(id) => Some(id),
                Event::End(_) => None,
            })
            .collect()
    }

    pub fn position(&self, event: Event) -> Option<usize> {
        self.events().iter().position(|e| *e == event)
    }
}

#[async_trait]
impl BuildRunner for RecordingRunner {
    async fn run(&self, task: &TaskSpec) -> BuildOutcome {
        self.log.lock().unwrap().push(Event::Start(task.id));
        let delay = self.delays.get(&task.id).copied().unwrap_or(self.default_delay);
        tokio::time::sleep(delay).await;
        self.log.lock().unwrap().push(Event::End(task.id));

        if self.failures.contains(&task.id) {
            BuildOutcome::failure(TaskError::Exit { code: Some(65) }, format!("{} failed", task.label), delay)
        } else {
            BuildOutcome::success(format!("{} built", task.label), delay)
        }
    }
}

pub fn spec(id: usize, deps: &[usize]) -> TaskSpec {
    TaskSpec::new(id, format!("/src/P{id}.xcodeproj"), format!("Building P{id}"))
        .with_dependencies(deps.iter().copied())
        .with_cost(1)
}

pub fn graph(specs: Vec<TaskSpec>) -> Arc<TaskGraph> {
    Arc::new(TaskGraph::new(specs).unwrap())
}

pub fn options(workers: usize) -> RunOptions {
    RunOptions {
        workers,
        ..RunOptions::default()
    }
}

/// Run the scheduler to completion, returning the summary and every output
/// chunk in arrival order.
pub async fn run(
    graph: Arc<TaskGraph>,
    runner: Arc<RecordingRunner>,
    opts: RunOptions,
) -> (RunSummary, Vec<OutputChunk>) {
    let (output_tx, mut output_rx) = mpsc::unbounded_channel();
    let summary = tokio::time::timeout(
        Duration::from_secs(30),
        Scheduler::new(graph, runner, opts).run(output_tx),
    )
    .await
    .expect("run timed out")
    .expect("scheduler error");

    let mut chunks = Vec::new();
    while let Some(chunk) = output_rx.recv().await {
        chunks.push(chunk);
    }
    (summary, chunks)
}

/// Check the dependency and exclusivity rules against a recorded timeline.
pub fn assert_invariants(graph: &TaskGraph, events: &[Event]) {
    let mut ended: HashSet<usize> = HashSet::new();
    let mut active: HashSet<usize> = HashSet::new();

    for event in events {
        match *event {
            Event::Start(id) => {
                let task = graph.task(id).unwrap();
                for dep in &task.spec().dependencies {
                    let skipped = graph.task(*dep).unwrap().state() == RunState::Skipped;
                    assert!(
                        ended.contains(dep) || skipped,
                        "task {id} started before dependency {dep} ended"
                    );
                }
                let alone_active = active.iter().any(|a| graph.task(*a).unwrap().spec().alone);
                assert!(!alone_active, "task {id} started beside an alone task");
                if task.spec().alone {
                    assert!(active.is_empty(), "alone task {id} started beside {active:?}");
                }
                active.insert(id);
            }
            Event::End(id) => {
                active.remove(&id);
                ended.insert(id);
            }
        }
    }
}

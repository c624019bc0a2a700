use std::collections::{BTreeSet, HashSet};

use crate::config::ProjectRule;
use crate::error::JobError;

use super::task::{RunState, Task, TaskSpec};

/// Task dependency graph (DAG) for one run.
///
/// Tasks are addressed by position; `dependents[i]` is the reverse edge list
/// of task `i`.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    dependents: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Construct and validate the graph. Rejects ids that do not match their
    /// position, dangling or self dependencies, and cycles.
    pub fn new(specs: Vec<TaskSpec>) -> Result<Self, JobError> {
        let count = specs.len();
        let mut dependents = vec![Vec::new(); count];

        for (position, spec) in specs.iter().enumerate() {
            if spec.id != position {
                return Err(JobError::IdMismatch {
                    position,
                    id: spec.id,
                });
            }
            for &dep in &spec.dependencies {
                if dep >= count {
                    return Err(JobError::DependencyNotFound {
                        task_id: spec.id,
                        missing_dep: dep,
                    });
                }
                if dep == spec.id {
                    return Err(JobError::SelfDependency(spec.id));
                }
                if !dependents[dep].contains(&spec.id) {
                    dependents[dep].push(spec.id);
                }
            }
        }

        let graph = Self {
            tasks: specs.into_iter().map(Task::new).collect(),
            dependents,
        };
        graph.topological_order()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: usize) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Set the `alone` and `ignore` flags from configuration rules. Returns
    /// how many tasks were flagged alone and ignored.
    pub fn apply_project_rules(&mut self, rules: &[ProjectRule]) -> (usize, usize) {
        let mut alone = 0;
        let mut ignore = 0;
        for task in &mut self.tasks {
            let spec = task.spec_mut();
            let (is_alone, is_ignored) = rules
                .iter()
                .filter(|r| r.matches(&spec.label, spec.project_name()))
                .fold((false, false), |(a, i), r| (a || r.alone, i || r.ignore));
            spec.alone |= is_alone;
            spec.ignore |= is_ignored;
            alone += usize::from(spec.alone);
            ignore += usize::from(spec.ignore);
        }
        (alone, ignore)
    }

    /// Pending tasks whose dependencies are all complete, in id order.
    pub fn ready_tasks(&self) -> Vec<usize> {
        self.tasks
            .iter()
            .filter(|t| t.is_pending())
            .filter(|t| {
                t.spec()
                    .dependencies
                    .iter()
                    .all(|&dep| self.is_complete(dep))
            })
            .map(Task::id)
            .collect()
    }

    pub fn is_complete(&self, id: usize) -> bool {
        self.tasks.get(id).is_some_and(Task::is_complete)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_complete()).count()
    }

    /// Tasks that list `id` as a direct dependency.
    pub fn direct_dependents(&self, id: usize) -> &[usize] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `id` directly depends on `target`.
    pub fn depends_on(&self, id: usize, target: usize) -> bool {
        self.tasks
            .get(id)
            .is_some_and(|t| t.spec().dependencies.contains(&target))
    }

    /// First task whose label contains `needle`.
    pub fn search(&self, needle: &str) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.label().contains(needle))
    }

    /// Every task whose label contains `needle`.
    pub fn search_all(&self, needle: &str) -> Vec<usize> {
        self.tasks
            .iter()
            .filter(|t| t.label().contains(needle))
            .map(Task::id)
            .collect()
    }

    /// Expand `seeds` with every task that depends on a member, directly or
    /// through other members, until a full pass adds nothing.
    pub fn transitive_closure(&self, seeds: impl IntoIterator<Item = usize>) -> BTreeSet<usize> {
        let mut set: BTreeSet<usize> = seeds.into_iter().filter(|&id| id < self.len()).collect();
        loop {
            let mut changed = false;
            for task in &self.tasks {
                if set.contains(&task.id()) {
                    continue;
                }
                if task.spec().dependencies.iter().any(|dep| set.contains(dep)) {
                    set.insert(task.id());
                    changed = true;
                }
            }
            if !changed {
                return set;
            }
        }
    }

    /// Complete a pending task without building it.
    pub fn mark_skipped(&self, id: usize) -> bool {
        self.tasks.get(id).is_some_and(Task::mark_skipped)
    }

    /// Skip every still-pending task flagged `ignore`. Returns how many
    /// transitioned.
    pub fn skip_ignored(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.spec().ignore)
            .filter(|t| t.mark_skipped())
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.state(), RunState::Skipped))
            .count()
    }

    /// Topological order using Kahn's algorithm, ties broken by id.
    pub fn topological_order(&self) -> Result<Vec<usize>, JobError> {
        let mut in_degree: Vec<usize> = self
            .tasks
            .iter()
            .map(|t| t.spec().dependencies.iter().collect::<HashSet<_>>().len())
            .collect();

        let mut frontier: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(id) = frontier.pop_first() {
            order.push(id);
            for &dependent in &self.dependents[id] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    frontier.insert(dependent);
                }
            }
        }

        if order.len() != self.len() {
            let cycle = self
                .detect_cycle()
                .unwrap_or_else(|| "unable to complete topological sort".to_string());
            return Err(JobError::CircularDependency(cycle));
        }

        Ok(order)
    }

    /// Detect circular dependencies using DFS; returns the cycle path.
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for id in 0..self.len() {
            if !visited.contains(&id) && self.dfs_cycle(id, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(&self, node: usize, visited: &mut HashSet<usize>, stack: &mut Vec<usize>) -> bool {
        visited.insert(node);
        stack.push(node);

        for &dep in &self.tasks[node].spec().dependencies {
            // Dependency already on the current path closes a cycle
            if let Some(pos) = stack.iter().position(|&x| x == dep) {
                stack.push(dep);
                *stack = stack[pos..].to_vec();
                return true;
            }

            if !visited.contains(&dep) && self.dfs_cycle(dep, visited, stack) {
                return true;
            }
        }

        stack.pop();
        false
    }
}

fn format_cycle_path(stack: &[usize]) -> String {
    stack
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(id: usize, deps: &[usize]) -> TaskSpec {
        TaskSpec::new(id, format!("/src/P{id}.xcodeproj"), format!("Building P{id}"))
            .with_dependencies(deps.iter().copied())
    }

    fn diamond() -> TaskGraph {
        // 0 <- 1, 0 <- 2, {1,2} <- 3, 4 standalone
        TaskGraph::new(vec![
            spec(0, &[]),
            spec(1, &[0]),
            spec(2, &[0]),
            spec(3, &[1, 2]),
            spec(4, &[]),
        ])
        .unwrap()
    }

    fn run(graph: &TaskGraph, id: usize) {
        let task = graph.task(id).unwrap();
        assert!(task.start());
        assert!(task.complete(Ok(()), String::new()));
    }

    #[test]
    fn ready_tasks_follow_dependencies() {
        let graph = diamond();
        assert_eq!(graph.ready_tasks(), vec![0, 4]);

        run(&graph, 0);
        assert_eq!(graph.ready_tasks(), vec![1, 2, 4]);

        run(&graph, 1);
        assert_eq!(graph.ready_tasks(), vec![2, 4]);

        run(&graph, 2);
        assert_eq!(graph.ready_tasks(), vec![3, 4]);
    }

    #[test]
    fn running_tasks_are_not_ready() {
        let graph = diamond();
        graph.task(0).unwrap().start();
        assert_eq!(graph.ready_tasks(), vec![4]);
    }

    #[test]
    fn skipped_dependencies_count_as_complete() {
        let graph = diamond();
        assert!(graph.mark_skipped(0));
        assert!(!graph.mark_skipped(0));
        assert!(graph.is_complete(0));
        assert_eq!(graph.ready_tasks(), vec![1, 2, 4]);
        assert_eq!(graph.completed_count(), 1);
    }

    #[test]
    fn dependents_and_depends_on() {
        let graph = diamond();
        assert_eq!(graph.direct_dependents(0), &[1, 2]);
        assert_eq!(graph.direct_dependents(4), &[] as &[usize]);
        assert_eq!(graph.direct_dependents(99), &[] as &[usize]);
        assert!(graph.depends_on(3, 1));
        assert!(!graph.depends_on(3, 0));
    }

    #[test]
    fn search_by_label() {
        let graph = diamond();
        assert_eq!(graph.search("P2"), Some(2));
        assert_eq!(graph.search("Building"), Some(0));
        assert_eq!(graph.search("missing"), None);
        assert_eq!(graph.search_all("Building P").len(), 5);
    }

    #[test]
    fn transitive_closure_reaches_fixed_point() {
        let graph = diamond();
        let closure = graph.transitive_closure([0]);
        assert_eq!(closure.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        let again = graph.transitive_closure(closure.iter().copied());
        assert_eq!(again, closure);

        let from_leaf = graph.transitive_closure([2, 42]);
        assert_eq!(from_leaf.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn transitive_closure_handles_reverse_id_order() {
        // 1 depends on 2 which depends on 0: a single pass in id order misses 1
        let chain = TaskGraph::new(vec![spec(0, &[]), spec(1, &[2]), spec(2, &[0])]).unwrap();
        let closure = chain.transitive_closure([0]);
        assert_eq!(closure.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn rejects_cycles_with_path() {
        let err = TaskGraph::new(vec![spec(0, &[]), spec(1, &[2]), spec(2, &[1])]).unwrap_err();
        match err {
            JobError::CircularDependency(path) => {
                assert!(path.contains("1 -> 2") || path.contains("2 -> 1"), "{path}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_bad_references() {
        assert!(matches!(
            TaskGraph::new(vec![spec(0, &[3])]),
            Err(JobError::DependencyNotFound {
                task_id: 0,
                missing_dep: 3
            })
        ));
        assert!(matches!(
            TaskGraph::new(vec![spec(0, &[0])]),
            Err(JobError::SelfDependency(0))
        ));
        assert!(matches!(
            TaskGraph::new(vec![spec(1, &[])]),
            Err(JobError::IdMismatch { position: 0, id: 1 })
        ));
    }

    #[test]
    fn topological_order_respects_edges() {
        let graph = diamond();
        let order = graph.topological_order().unwrap();
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(0) < pos(1));
        assert!(pos(0) < pos(2));
        assert!(pos(1) < pos(3));
        assert!(pos(2) < pos(3));
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn project_rules_set_flags() {
        let mut graph = diamond();
        let rules = vec![
            ProjectRule {
                name: "P1".into(),
                alone: true,
                ignore: false,
            },
            ProjectRule {
                name: "P4".into(),
                alone: false,
                ignore: true,
            },
        ];
        assert_eq!(graph.apply_project_rules(&rules), (1, 1));
        assert!(graph.task(1).unwrap().spec().alone);
        assert!(graph.task(4).unwrap().spec().ignore);
        assert!(!graph.task(0).unwrap().spec().alone);
    }

    #[test]
    fn ignored_tasks_are_skipped_once() {
        let mut graph = diamond();
        graph.apply_project_rules(&[ProjectRule {
            name: "P4".into(),
            alone: false,
            ignore: true,
        }]);
        assert_eq!(graph.skip_ignored(), 1);
        assert_eq!(graph.skip_ignored(), 0);
        assert_eq!(graph.skipped_count(), 1);
        assert!(graph.is_complete(4));
    }
}

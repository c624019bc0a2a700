use std::collections::BTreeSet;

use mpbuild_core::TaskGraph;

use crate::cli::Args;

/// Pre-run filters narrowing which projects get built. Everything filtered
/// out is marked skipped before the scheduler starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: Option<String>,
    pub only: Vec<String>,
    pub from: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    /// Tasks newly marked skipped.
    pub skipped: usize,
    /// Searches that matched no task.
    pub unmatched: Vec<String>,
}

impl Selection {
    pub fn from_args(args: &Args) -> Self {
        Self {
            start: args.start.clone(),
            only: args.only.clone(),
            from: args.from.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.only.is_empty() && self.from.is_empty()
    }

    pub fn apply(&self, graph: &TaskGraph) -> SelectionReport {
        let mut report = SelectionReport::default();

        if let Some(needle) = &self.start {
            match graph.search(needle) {
                Some(first) => {
                    report.skipped += (0..first).filter(|&id| graph.mark_skipped(id)).count();
                }
                None => {
                    tracing::warn!(search = %needle, "--start matched no project; building from the beginning");
                    report.unmatched.push(needle.clone());
                }
            }
        }

        if !self.only.is_empty() {
            for needle in &self.only {
                if graph.search(needle).is_none() {
                    tracing::warn!(search = %needle, "--only matched no project");
                    report.unmatched.push(needle.clone());
                }
            }
            report.skipped += graph
                .tasks()
                .filter(|t| !self.only.iter().any(|n| t.label().contains(n.as_str())))
                .filter(|t| t.mark_skipped())
                .count();
        }

        if !self.from.is_empty() {
            let mut seeds = BTreeSet::new();
            for needle in &self.from {
                let hits = graph.search_all(needle);
                if hits.is_empty() {
                    tracing::warn!(search = %needle, "--from matched no project");
                    report.unmatched.push(needle.clone());
                }
                seeds.extend(hits);
            }
            if seeds.is_empty() {
                tracing::warn!("--from matched nothing; filter ignored");
            } else {
                let keep = graph.transitive_closure(seeds);
                report.skipped += graph
                    .tasks()
                    .filter(|t| !keep.contains(&t.id()))
                    .filter(|t| t.mark_skipped())
                    .count();
            }
        }

        if report.skipped > 0 {
            tracing::info!(skipped = report.skipped, "projects deselected");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpbuild_core::{RunState, TaskSpec};
    use pretty_assertions::assert_eq;

    // 0 Base <- 1 Core <- 2 App
    //        <- 3 Tools
    // 4 Docs
    fn graph() -> TaskGraph {
        TaskGraph::new(vec![
            TaskSpec::new(0, "Base.proj", "Building Base"),
            TaskSpec::new(1, "Core.proj", "Building Core").with_dependencies([0]),
            TaskSpec::new(2, "App.proj", "Building App").with_dependencies([1]),
            TaskSpec::new(3, "Tools.proj", "Building Tools").with_dependencies([0]),
            TaskSpec::new(4, "Docs.proj", "Building Docs"),
        ])
        .unwrap()
    }

    fn skipped(graph: &TaskGraph) -> Vec<usize> {
        graph
            .tasks()
            .filter(|t| t.state() == RunState::Skipped)
            .map(|t| t.id())
            .collect()
    }

    #[test]
    fn empty_selection_changes_nothing() {
        let g = graph();
        let sel = Selection::default();
        assert!(sel.is_empty());
        assert_eq!(sel.apply(&g), SelectionReport::default());
        assert!(skipped(&g).is_empty());
    }

    #[test]
    fn start_skips_everything_before_the_match() {
        let g = graph();
        let sel = Selection {
            start: Some("App".into()),
            ..Default::default()
        };
        let report = sel.apply(&g);
        assert_eq!(report.skipped, 2);
        assert_eq!(skipped(&g), vec![0, 1]);
    }

    #[test]
    fn start_without_match_is_ignored() {
        let g = graph();
        let sel = Selection {
            start: Some("Nope".into()),
            ..Default::default()
        };
        let report = sel.apply(&g);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.unmatched, vec!["Nope".to_string()]);
    }

    #[test]
    fn only_keeps_matching_labels() {
        let g = graph();
        let sel = Selection {
            only: vec!["Core".into(), "Docs".into()],
            ..Default::default()
        };
        sel.apply(&g);
        assert_eq!(skipped(&g), vec![0, 2, 3]);
    }

    #[test]
    fn from_keeps_dependents_closure() {
        let g = graph();
        let sel = Selection {
            from: vec!["Core".into()],
            ..Default::default()
        };
        let report = sel.apply(&g);
        assert_eq!(skipped(&g), vec![0, 3, 4]);
        assert_eq!(report.skipped, 3);
    }

    #[test]
    fn from_without_any_match_is_ignored() {
        let g = graph();
        let sel = Selection {
            from: vec!["Nope".into()],
            ..Default::default()
        };
        let report = sel.apply(&g);
        assert!(skipped(&g).is_empty());
        assert_eq!(report.unmatched, vec!["Nope".to_string()]);
    }

    #[test]
    fn filters_combine() {
        let g = graph();
        let sel = Selection {
            start: Some("Core".into()),
            from: vec!["Base".into()],
            ..Default::default()
        };
        let report = sel.apply(&g);
        // start skips Base; from keeps Base's closure, dropping Docs
        assert_eq!(skipped(&g), vec![0, 4]);
        assert_eq!(report.skipped, 2);
    }
}

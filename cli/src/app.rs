use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use mpbuild_core::config::{AppConfig, Platform};
use mpbuild_core::{Job, TaskGraph};

use crate::cli::Args;
use crate::error::CliError;
use crate::selection::Selection;

/// Load the job, apply configuration rules and selection, then build.
/// Returns the process exit code.
pub async fn run_app(args: &Args, cfg: &AppConfig) -> Result<i32, CliError> {
    let mut job = Job::load(&args.job)?;
    let platform = resolve_platform(args, &job, cfg);

    let (alone, ignore) = job.graph.apply_project_rules(&cfg.projects);
    let ignored = job.graph.skip_ignored();
    tracing::debug!(alone, ignore, ignored, "project rules applied");

    let selection = Selection::from_args(args);
    if !selection.is_empty() {
        selection.apply(&job.graph);
    }

    let graph = Arc::new(job.graph);
    if args.dry_run {
        let mut out = std::io::stdout().lock();
        print_plan(&mut out, &graph, platform, cfg)?;
        return Ok(0);
    }

    tracing::info!(
        job = %args.job.display(),
        %platform,
        tasks = graph.len(),
        workers = cfg.workers,
        "building"
    );
    let summary = mpbuild_core::run_graph(graph, platform, cfg).await?;

    match summary.first_failure {
        None => Ok(0),
        Some(failure) => {
            tracing::error!(task_id = failure.task_id, "{failure}");
            Ok(1)
        }
    }
}

/// `--platform` wins over the job document, which wins over configuration.
fn resolve_platform(args: &Args, job: &Job, cfg: &AppConfig) -> Platform {
    match args.platform {
        Some(p) => p.into(),
        None => job.platform_or(cfg.platform),
    }
}

/// Write the command of every task that would build, in dependency order.
pub fn print_plan<W: Write>(
    out: &mut W,
    graph: &TaskGraph,
    platform: Platform,
    cfg: &AppConfig,
) -> Result<(), CliError> {
    let runner = mpbuild_core::process_runner(platform, cfg)?;
    let order = graph
        .topological_order()
        .map_err(CliError::Job)?;

    for id in order {
        let Some(task) = graph.task(id) else {
            continue;
        };
        if task.is_complete() {
            continue;
        }
        let marker = if task.spec().alone { " [alone]" } else { "" };
        writeln!(out, "[{id}] {}{marker}", task.label()).context("writing plan")?;
        writeln!(out, "    {}", runner.planner().plan(task.spec())).context("writing plan")?;
    }
    out.flush().context("writing plan")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpbuild_core::TaskSpec;

    #[test]
    fn plan_lists_pending_tasks_in_dependency_order() {
        let graph = TaskGraph::new(vec![
            TaskSpec::new(0, "/p/App.xcodeproj", "Building App").with_dependencies([1]),
            TaskSpec::new(1, "/p/Core.xcodeproj", "Building Core").with_alone(true),
            TaskSpec::new(2, "/p/Docs.xcodeproj", "Building Docs"),
        ])
        .unwrap();
        graph.mark_skipped(2);

        let mut cfg = AppConfig::default();
        cfg.threads = 0;
        let mut out = Vec::new();
        print_plan(&mut out, &graph, Platform::Xcode, &cfg).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "[1] Building Core [alone]");
        assert_eq!(
            lines[1],
            "    xcodebuild -project /p/Core.xcodeproj -target Core.Debug -configuration Default build"
        );
        assert_eq!(lines[2], "[0] Building App");
    }

    #[test]
    fn platform_precedence() {
        let job = Job::from_json_str(r#"{"platform":"msbuild","tasks":[]}"#).unwrap();
        let cfg = AppConfig::default();

        let args = <Args as clap::Parser>::try_parse_from(["mpbuild", "-j", "x.json"]).unwrap();
        assert_eq!(resolve_platform(&args, &job, &cfg), Platform::Msbuild);

        let args = <Args as clap::Parser>::try_parse_from([
            "mpbuild",
            "-j",
            "x.json",
            "--platform",
            "xcode",
        ])
        .unwrap();
        assert_eq!(resolve_platform(&args, &job, &cfg), Platform::Xcode);
    }
}

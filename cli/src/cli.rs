use std::path::PathBuf;

use clap::Parser;
use mpbuild_core::config::{AppConfig, Platform};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformArg {
    Xcode,
    Msbuild,
}

impl From<PlatformArg> for Platform {
    fn from(p: PlatformArg) -> Self {
        match p {
            PlatformArg::Xcode => Platform::Xcode,
            PlatformArg::Msbuild => Platform::Msbuild,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "mpbuild", version, about = "Build a project dependency graph in parallel")]
pub struct Args {
    /// Job document (JSON) describing the projects to build.
    #[arg(long, short = 'j', value_name = "FILE")]
    pub job: PathBuf,

    /// Config file; skips the default lookup.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write the log, including build output, to this file.
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Number of concurrent builds.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Parallelism handed to each build tool invocation (0 = tool default).
    #[arg(long, short = 't')]
    pub threads: Option<usize>,

    /// Build configuration, e.g. Debug or Release.
    #[arg(long)]
    pub configuration: Option<String>,

    /// Override the job's platform.
    #[arg(long, value_enum)]
    pub platform: Option<PlatformArg>,

    /// Build for device (arm64 / iphoneos).
    #[arg(long)]
    pub ios: bool,

    /// Do not print captured build output.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Show a progress bar on stderr.
    #[arg(long)]
    pub progress: bool,

    /// Skip every project before the first one whose label contains this.
    #[arg(long, value_name = "SEARCH")]
    pub start: Option<String>,

    /// Build only projects whose label contains one of these.
    #[arg(long, value_name = "SEARCH", action = clap::ArgAction::Append)]
    pub only: Vec<String>,

    /// Build only matching projects and everything depending on them.
    #[arg(long, value_name = "SEARCH", action = clap::ArgAction::Append)]
    pub from: Vec<String>,

    /// Keep building after a failure.
    #[arg(long)]
    pub continue_on_error: bool,

    /// Write JSONL run events to this path ("stdout:" for standard output).
    #[arg(long, value_name = "PATH")]
    pub events: Option<String>,

    /// Disable stall detection.
    #[arg(long)]
    pub no_watchdog: bool,

    /// Print the build commands in dependency order without running them.
    #[arg(long)]
    pub dry_run: bool,

    /// -v for debug, -vv for trace.
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_to(&self, cfg: &mut AppConfig) {
        if let Some(workers) = self.workers {
            cfg.workers = workers;
        }
        if let Some(threads) = self.threads {
            cfg.threads = threads;
        }
        if let Some(configuration) = &self.configuration {
            cfg.configuration = configuration.clone();
        }
        if let Some(platform) = self.platform {
            cfg.platform = platform.into();
        }
        cfg.ios |= self.ios;
        cfg.continue_on_error |= self.continue_on_error;
        cfg.output.quiet |= self.quiet;
        cfg.output.progress_bar |= self.progress;
        if self.no_watchdog {
            cfg.watchdog.enabled = false;
        }
        if let Some(events) = &self.events {
            cfg.events_out.enabled = true;
            cfg.events_out.path = events.clone();
        }
        if self.log.is_some() {
            cfg.logging.file = true;
        }
        match self.verbose {
            0 => {}
            1 => cfg.logging.level = "debug".into(),
            _ => cfg.logging.level = "trace".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("mpbuild").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn job_is_required() {
        assert!(Args::try_parse_from(["mpbuild"]).is_err());
    }

    #[test]
    fn repeatable_filters() {
        let args = parse(&["--job", "j.json", "--only", "Core", "--only", "Ui", "--from", "Base"]);
        assert_eq!(args.only, vec!["Core", "Ui"]);
        assert_eq!(args.from, vec!["Base"]);
        assert_eq!(args.start, None);
    }

    #[test]
    fn overrides_config() {
        let args = parse(&[
            "-j",
            "j.json",
            "-w",
            "6",
            "--threads",
            "0",
            "--platform",
            "msbuild",
            "--continue-on-error",
            "--no-watchdog",
            "--events",
            "stdout:",
            "-vv",
        ]);
        let mut cfg = AppConfig::default();
        args.apply_to(&mut cfg);

        assert_eq!(cfg.workers, 6);
        assert_eq!(cfg.threads, 0);
        assert_eq!(cfg.platform, Platform::Msbuild);
        assert!(cfg.continue_on_error);
        assert!(!cfg.watchdog.enabled);
        assert!(cfg.events_out.enabled);
        assert_eq!(cfg.events_out.path, "stdout:");
        assert_eq!(cfg.logging.level, "trace");
    }

    #[test]
    fn absent_flags_keep_config() {
        let args = parse(&["--job", "j.json"]);
        let mut cfg = AppConfig::default();
        cfg.workers = 9;
        cfg.output.quiet = true;
        args.apply_to(&mut cfg);
        assert_eq!(cfg.workers, 9);
        assert!(cfg.output.quiet);
        assert!(cfg.watchdog.enabled);
    }
}

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Number of concurrent build workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Parallelism passed to the build tool; 0 leaves the tool's default.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Build configuration, e.g. "Debug" or "Release".
    #[serde(default = "default_configuration")]
    pub configuration: String,

    /// Command family used when the job document carries no platform tag.
    #[serde(default)]
    pub platform: Platform,

    /// Build for device (arm64 / iphoneos) instead of the host.
    #[serde(default)]
    pub ios: bool,

    #[serde(default)]
    pub continue_on_error: bool,

    #[serde(default)]
    pub projects: Vec<ProjectRule>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,

    #[serde(default)]
    pub msbuild: MsBuildConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_workers() -> usize {
    3
}

fn default_threads() -> usize {
    10
}

fn default_configuration() -> String {
    "Debug".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            threads: default_threads(),
            configuration: default_configuration(),
            platform: Platform::default(),
            ios: false,
            continue_on_error: false,
            projects: Vec::new(),
            logging: LoggingConfig::default(),
            watchdog: WatchdogConfig::default(),
            msbuild: MsBuildConfig::default(),
            events_out: EventsOutConfig::default(),
            scheduler: SchedulerConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Build tool family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Xcode,
    Msbuild,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Xcode => f.write_str("xcode"),
            Platform::Msbuild => f.write_str("msbuild"),
        }
    }
}

/// Per-project scheduling rule, matched against task labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRule {
    pub name: String,

    /// Run this project with nothing else building beside it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub alone: bool,

    /// Never build this project; it counts as completed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
}

impl ProjectRule {
    /// A rule matches when the label contains its name, or when the
    /// artifact's project name equals it.
    pub fn matches(&self, label: &str, project_name: &str) -> bool {
        !self.name.is_empty() && (label.contains(&self.name) || project_name == self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "mpbuild_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_watchdog_enabled")]
    pub enabled: bool,

    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// CPU percentage at or below which a sample counts as idle.
    #[serde(default = "default_idle_cpu_percent")]
    pub idle_cpu_percent: f32,

    #[serde(default = "default_idle_increment")]
    pub idle_increment: f64,

    /// Multiplier applied to the score on an active sample, in (0, 1).
    #[serde(default = "default_decay")]
    pub decay: f64,

    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Count CPU used by descendants of the build process as activity.
    #[serde(default = "default_include_children")]
    pub include_children: bool,
}

fn default_watchdog_enabled() -> bool {
    true
}

fn default_sample_interval_ms() -> u64 {
    1000
}

fn default_idle_cpu_percent() -> f32 {
    0.5
}

fn default_idle_increment() -> f64 {
    1.0
}

fn default_decay() -> f64 {
    0.5
}

fn default_threshold() -> f64 {
    300.0
}

fn default_include_children() -> bool {
    true
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: default_watchdog_enabled(),
            sample_interval_ms: default_sample_interval_ms(),
            idle_cpu_percent: default_idle_cpu_percent(),
            idle_increment: default_idle_increment(),
            decay: default_decay(),
            threshold: default_threshold(),
            include_children: default_include_children(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsBuildConfig {
    /// Platform half of the configuration/platform pair.
    #[serde(default = "default_msbuild_platform")]
    pub platform: String,

    /// Candidate driver locations, probed in order.
    #[serde(default = "default_msbuild_search_paths")]
    pub search_paths: Vec<PathBuf>,
}

fn default_msbuild_platform() -> String {
    "x64".to_string()
}

fn default_msbuild_search_paths() -> Vec<PathBuf> {
    [
        r"C:\Program Files\Microsoft Visual Studio\2022\Enterprise\MSBuild\Current\Bin\MSBuild.exe",
        r"C:\Program Files\Microsoft Visual Studio\2022\Professional\MSBuild\Current\Bin\MSBuild.exe",
        r"C:\Program Files\Microsoft Visual Studio\2022\Community\MSBuild\Current\Bin\MSBuild.exe",
        r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Enterprise\MSBuild\Current\Bin\MSBuild.exe",
        r"C:\Program Files (x86)\Microsoft Visual Studio\2019\Professional\MSBuild\Current\Bin\MSBuild.exe",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

impl Default for MsBuildConfig {
    fn default() -> Self {
        Self {
            platform: default_msbuild_platform(),
            search_paths: default_msbuild_search_paths(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    #[serde(default)]
    pub enabled: bool,
    /// JSONL destination; "stdout:" writes to standard output.
    #[serde(default)]
    pub path: String,

    #[serde(default = "default_events_channel_capacity")]
    pub channel_capacity: usize,

    /// Drop events instead of waiting when the writer falls behind.
    #[serde(default)]
    pub drop_when_full: bool,
}

fn default_events_channel_capacity() -> usize {
    1024
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: String::new(),
            channel_capacity: default_events_channel_capacity(),
            drop_when_full: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on a single wait for build results. Unset waits until
    /// the next result arrives.
    #[serde(default)]
    pub drain_deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Suppress captured build output on stdout.
    #[serde(default)]
    pub quiet: bool,

    #[serde(default)]
    pub progress_bar: bool,

    /// Log every captured output line through tracing.
    #[serde(default = "default_log_output")]
    pub log_output: bool,

    /// Per-task capture budget in bytes; older lines are dropped first.
    /// 0 keeps everything.
    #[serde(default = "default_capture_bytes")]
    pub capture_bytes: usize,
}

fn default_log_output() -> bool {
    true
}

fn default_capture_bytes() -> usize {
    8 * 1024 * 1024
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            progress_bar: false,
            log_output: default_log_output(),
            capture_bytes: default_capture_bytes(),
        }
    }
}

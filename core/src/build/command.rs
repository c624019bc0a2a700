use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::{AppConfig, Platform};
use crate::error::ConfigError;
use crate::job::TaskSpec;
use crate::toolchain::ToolchainLocator;

/// A fully-resolved build process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
    pub envs: HashMap<String, String>,
}

impl BuildCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Options that shape every build command of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub configuration: String,
    /// Parallelism handed to the build tool.
    pub threads: Option<usize>,
    pub ios: bool,
    pub msbuild_platform: String,
}

impl BuildSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            configuration: cfg.configuration.clone(),
            threads: (cfg.threads > 0).then_some(cfg.threads),
            ios: cfg.ios,
            msbuild_platform: cfg.msbuild.platform.clone(),
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Turns tasks into platform-specific build commands.
#[derive(Debug, Clone)]
pub enum CommandPlanner {
    Xcode {
        settings: BuildSettings,
    },
    Msbuild {
        driver: PathBuf,
        settings: BuildSettings,
    },
}

impl CommandPlanner {
    /// Resolve everything the platform needs up front; the msbuild family
    /// fails here when no driver is installed.
    pub fn new(
        platform: Platform,
        settings: BuildSettings,
        locator: &dyn ToolchainLocator,
    ) -> Result<Self, ConfigError> {
        match platform {
            Platform::Xcode => Ok(Self::Xcode { settings }),
            Platform::Msbuild => {
                let driver = locator.locate()?;
                tracing::info!(driver = %driver.display(), "using msbuild driver");
                Ok(Self::Msbuild { driver, settings })
            }
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Self::Xcode { .. } => Platform::Xcode,
            Self::Msbuild { .. } => Platform::Msbuild,
        }
    }

    pub fn plan(&self, task: &TaskSpec) -> BuildCommand {
        match self {
            Self::Xcode { settings } => xcode_command(task, settings),
            Self::Msbuild { driver, settings } => msbuild_command(driver, task, settings),
        }
    }
}

fn xcode_command(task: &TaskSpec, settings: &BuildSettings) -> BuildCommand {
    let target = format!("{}.{}", task.project_name(), settings.configuration);
    let mut cmd = BuildCommand::new("xcodebuild").args([
        "-project",
        task.locator.as_str(),
        "-target",
        target.as_str(),
        "-configuration",
        "Default",
    ]);

    if let Some(threads) = settings.threads {
        cmd = cmd.arg("-jobs").arg(threads.to_string());
    }
    if settings.ios {
        cmd = cmd.args(["-arch", "arm64", "-sdk", "iphoneos"]);
    }
    cmd.arg("build")
}

fn msbuild_command(driver: &std::path::Path, task: &TaskSpec, settings: &BuildSettings) -> BuildCommand {
    let mut cmd = BuildCommand::new(driver.to_string_lossy()).args([
        task.locator.clone(),
        format!("/p:Configuration={}", settings.configuration),
        format!("/p:Platform={}", settings.msbuild_platform),
    ]);

    if let Some(threads) = settings.threads {
        cmd = cmd.arg(format!("/m:{threads}"));
    }
    cmd.arg("/nologo")
}

//! Locating installed build tool drivers.

use std::path::{Path, PathBuf};

use crate::config::MsBuildConfig;
use crate::error::ConfigError;

/// Resolves the build tool driver before a run starts. Failing to find one is
/// a configuration error, not a task error.
pub trait ToolchainLocator: Send + Sync {
    fn locate(&self) -> Result<PathBuf, ConfigError>;
}

/// Probes an ordered list of candidate paths and picks the first that exists.
#[derive(Debug, Clone, Default)]
pub struct PathListLocator {
    candidates: Vec<PathBuf>,
}

impl PathListLocator {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    pub fn from_config(cfg: &MsBuildConfig) -> Self {
        Self::new(cfg.search_paths.clone())
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }
}

impl ToolchainLocator for PathListLocator {
    fn locate(&self) -> Result<PathBuf, ConfigError> {
        for candidate in &self.candidates {
            if Path::new(candidate).exists() {
                tracing::debug!(path = %candidate.display(), "toolchain found");
                return Ok(candidate.clone());
            }
            tracing::trace!(path = %candidate.display(), "toolchain candidate missing");
        }
        Err(ConfigError::toolchain_not_found(&self.candidates))
    }
}

/// A locator that always answers with the same path; for callers that
/// already know where the driver lives.
#[derive(Debug, Clone)]
pub struct FixedLocator(pub PathBuf);

impl ToolchainLocator for FixedLocator {
    fn locate(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let second = dir.path().join("second.exe");
        let third = dir.path().join("third.exe");
        std::fs::write(&second, b"").unwrap();
        std::fs::write(&third, b"").unwrap();

        let locator = PathListLocator::new(vec![dir.path().join("first.exe"), second.clone(), third]);
        assert_eq!(locator.locate().unwrap(), second);
    }

    #[test]
    fn none_found_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let locator = PathListLocator::new(vec![dir.path().join("nope.exe")]);
        let err = locator.locate().unwrap_err();
        assert!(matches!(err, ConfigError::ToolchainNotFound { .. }));
        assert!(err.to_string().contains("nope.exe"));

        let empty = PathListLocator::default();
        assert!(empty.locate().is_err());
    }
}

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::AppConfig;

/// Get the default mpbuild data directory: ~/.mpbuild
pub fn get_mpbuild_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".mpbuild"))
}

pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_default() -> Result<AppConfig, ConfigError> {
    load(None)
}

/// Load from `explicit` when given, otherwise from the first existing
/// default location; then apply environment overrides and validate.
pub fn load(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    if let Some(path) = explicit {
        let mut cfg = load_from_path(path)?;
        apply_env_overrides(&mut cfg)?;
        validate(&cfg)?;
        return Ok(cfg);
    }

    // Priority 1: $MPBUILD_CONFIG
    let explicit = std::env::var_os("MPBUILD_CONFIG")
        .map(PathBuf::from)
        .filter(|p| !p.as_os_str().is_empty());

    // Priority 2: ~/.mpbuild/config.toml
    let home_config = get_mpbuild_data_dir().map(|d| d.join("config.toml"));

    // Priority 3: ./mpbuild.toml (current directory)
    let local_config = Path::new("mpbuild.toml");

    let mut cfg = if let Some(path) = explicit {
        load_from_path(&path)?
    } else if let Some(path) = home_config.filter(|p| p.exists()) {
        load_from_path(&path)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut AppConfig) -> Result<(), ConfigError> {
    if let Ok(v) = std::env::var("MPBUILD_WORKERS") {
        if !v.trim().is_empty() {
            cfg.workers = parse_count("MPBUILD_WORKERS", &v)?;
        }
    }
    if let Ok(v) = std::env::var("MPBUILD_THREADS") {
        if !v.trim().is_empty() {
            cfg.threads = parse_count("MPBUILD_THREADS", &v)?;
        }
    }
    Ok(())
}

fn parse_count(key: &'static str, v: &str) -> Result<usize, ConfigError> {
    v.trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
        })
}

/// Reject values the scheduler and watchdog cannot work with.
pub fn validate(cfg: &AppConfig) -> Result<(), ConfigError> {
    if cfg.workers == 0 {
        return Err(ConfigError::InvalidValue {
            key: "workers",
            reason: "at least one worker is required".into(),
        });
    }
    let wd = &cfg.watchdog;
    if !(wd.decay > 0.0 && wd.decay < 1.0) {
        return Err(ConfigError::InvalidValue {
            key: "watchdog.decay",
            reason: format!("{} is not in (0, 1)", wd.decay),
        });
    }
    if wd.threshold <= 0.0 || wd.idle_increment <= 0.0 {
        return Err(ConfigError::InvalidValue {
            key: "watchdog.threshold",
            reason: "threshold and idle_increment must be positive".into(),
        });
    }
    if wd.sample_interval_ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: "watchdog.sample_interval_ms",
            reason: "must be non-zero".into(),
        });
    }
    Ok(())
}

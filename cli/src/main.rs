use std::path::Path;

use clap::Parser;
use mpbuild_cli::app;
use mpbuild_cli::cli::Args;
use mpbuild_cli::error::CliError;
use mpbuild_core::aggregator::OUTPUT_TARGET;
use mpbuild_core::config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mpbuild: {e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = Args::parse();
    let mut cfg = mpbuild_core::config::load(args.config.as_deref())?;
    args.apply_to(&mut cfg);
    mpbuild_core::config::validate(&cfg)?;
    init_tracing(&cfg.logging, args.log.as_deref()).map_err(CliError::Logging)?;

    app::run_app(&args, &cfg).await
}

fn init_tracing(logging: &LoggingConfig, log_file: Option<&Path>) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let directives = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => v,
        _ => logging.level.clone(),
    };
    // build output already goes to stdout; only the log file gets a copy
    let console_filter =
        EnvFilter::try_new(format!("{directives},{OUTPUT_TARGET}=off")).map_err(|e| e.to_string())?;
    let file_filter =
        EnvFilter::try_new(format!("{directives},{OUTPUT_TARGET}=debug")).map_err(|e| e.to_string())?;

    let mut maybe_writer = None;

    if logging.file {
        let (dir, file_name) = match log_file {
            Some(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| std::path::PathBuf::from("."));
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .ok_or_else(|| format!("invalid log file path: {}", path.display()))?;
                (dir, name)
            }
            None => {
                let dir = match logging
                    .directory
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                {
                    Some(d) => std::path::PathBuf::from(d),
                    None => std::env::temp_dir().join("mpbuild"),
                };
                (dir, format!("mpbuild.{}.log", std::process::id()))
            }
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .with_target(false)
            .with_filter(console_filter)
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
            .with_filter(file_filter)
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

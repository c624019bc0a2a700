#![cfg(unix)]

use std::path::Path;
use std::process::{Command, Output};

fn write(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().to_string()
}

/// Config that drives the msbuild command family with `sh` as the driver.
fn config(dir: &Path, extra: &str) -> String {
    write(
        dir,
        "mpbuild.toml",
        &format!(
            r#"
platform = "msbuild"
workers = 2
{extra}

[msbuild]
search_paths = ["/no/such/MSBuild.exe", "/bin/sh"]

[watchdog]
enabled = false
"#
        ),
    )
}

fn job(dir: &Path, scripts: &[(&str, &str, &[usize])]) -> String {
    let tasks: Vec<String> = scripts
        .iter()
        .enumerate()
        .map(|(id, (name, body, deps))| {
            let path = write(dir, &format!("{name}.sh"), body);
            format!(
                r#"{{"id": {id}, "cost": 1, "inputs": {deps:?}, "made_proj": "{path}", "messages": "Building {name}"}}"#
            )
        })
        .collect();
    write(dir, "job.json", &format!(r#"{{"tasks": [{}]}}"#, tasks.join(",")))
}

fn mpbuild(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mpbuild"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("MPBUILD_WORKERS")
        .env_remove("MPBUILD_THREADS")
        .output()
        .unwrap()
}

#[test]
fn builds_job_and_prints_output() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), "");
    let job = job(
        dir.path(),
        &[("Base", "echo base built\n", &[]), ("App", "echo app built\n", &[0])],
    );

    let out = mpbuild(&["--job", &job, "--config", &cfg]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout, "base built\napp built\n");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("->Done Building App (2/2"));
}

#[test]
fn failed_build_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), "");
    let job = job(dir.path(), &[("Bad", "exit 3\n", &[]), ("After", "echo never\n", &[0])]);

    let out = mpbuild(&["--job", &job, "--config", &cfg, "--quiet"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Error Building Bad (exit status 3)"));
}

#[test]
fn selection_skips_projects() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), "");
    let job = job(
        dir.path(),
        &[("Base", "echo base\n", &[]), ("App", "echo app\n", &[0]), ("Docs", "echo docs\n", &[])],
    );

    let out = mpbuild(&["--job", &job, "--config", &cfg, "--from", "App"]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "app\n");
}

#[test]
fn dry_run_prints_commands() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), "threads = 0");
    let job = job(dir.path(), &[("Base", "exit 1\n", &[])]);

    let out = mpbuild(&["--job", &job, "--config", &cfg, "--dry-run"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("[0] Building Base\n    /bin/sh "));
    assert!(stdout.contains("/p:Configuration=Debug /p:Platform=x64 /nologo"));
}

#[test]
fn invalid_job_exits_with_twelve() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), "");
    let job = write(
        dir.path(),
        "job.json",
        r#"{"tasks": [{"id": 0, "inputs": [0], "made_proj": "A", "messages": "A"}]}"#,
    );

    let out = mpbuild(&["--job", &job, "--config", &cfg]);
    assert_eq!(out.status.code(), Some(12));
}

#[test]
fn invalid_config_exits_with_eleven() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(dir.path(), "bad.toml", "workers = \"lots\"\n");
    let job = job(dir.path(), &[("Base", "echo base\n", &[])]);

    let out = mpbuild(&["--job", &job, "--config", &cfg]);
    assert_eq!(out.status.code(), Some(11));
}

#[test]
fn missing_toolchain_exits_with_eleven() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = write(
        dir.path(),
        "mpbuild.toml",
        "platform = \"msbuild\"\n[msbuild]\nsearch_paths = [\"/no/such/MSBuild.exe\"]\n",
    );
    let job = job(dir.path(), &[("Base", "echo base\n", &[])]);

    let out = mpbuild(&["--job", &job, "--config", &cfg]);
    assert_eq!(out.status.code(), Some(11));
    assert!(String::from_utf8_lossy(&out.stderr).contains("no build toolchain found"));
}

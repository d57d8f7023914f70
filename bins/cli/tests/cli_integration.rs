//! CLI integration tests against the built binary.

use std::path::Path;
use std::process::Command;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn run_cli_clean_env(args: &[&str]) -> std::io::Result<std::process::Output> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_switch-sync"));
    command.args(args);
    for (key, _) in std::env::vars() {
        if key.starts_with("SWITCH_SYNC_") {
            command.env_remove(key);
        }
    }
    command.output()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn version_prints_package_version() -> TestResult {
    let output = run_cli_clean_env(&["--version"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn info_ndjson_is_a_single_summary_line() -> TestResult {
    let output = run_cli_clean_env(&["--output", "ndjson", "info"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert_eq!(stdout.lines().count(), 1);
    let value: serde_json::Value = serde_json::from_str(stdout.trim())?;
    assert_eq!(value.get("kind"), Some(&serde_json::json!("info")));
    Ok(())
}

#[test]
fn init_then_validate_round_trip() -> TestResult {
    let temp = tempfile::tempdir()?;
    let config = path_arg(&temp.path().join("switch-sync.toml"));

    let init = run_cli_clean_env(&["config", "init", "--path", &config])?;
    assert!(init.status.success());

    let validate = run_cli_clean_env(&["--output", "json", "config", "validate", "--config", &config])?;
    assert!(validate.status.success());
    let value: serde_json::Value = serde_json::from_slice(&validate.stdout)?;
    assert_eq!(value.get("status"), Some(&serde_json::json!("ok")));
    Ok(())
}

#[test]
fn env_override_is_validated() -> TestResult {
    let output = Command::new(env!("CARGO_BIN_EXE_switch-sync"))
        .args(["config", "validate"])
        .env("SWITCH_SYNC_PORT", "70000")
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("status: error"));
    Ok(())
}

#[test]
fn run_without_targets_exits_with_invalid_input() -> TestResult {
    let output = run_cli_clean_env(&["run", "--once", "--no-progress"])?;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8(output.stdout)?.contains("sync:no_targets"));
    Ok(())
}

#[test]
fn unknown_subcommand_is_rejected_by_clap() -> TestResult {
    let output = run_cli_clean_env(&["index"])?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

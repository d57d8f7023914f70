//! CLI binary entrypoint.

mod commands;
mod error;
mod format;

use clap::{Parser, Subcommand};
use commands::{
    RunCommandInput, run_config_init, run_config_show, run_config_validate, run_info, run_sync,
};
use error::{CliError, ExitCode};
use format::{LogFormatArg, OutputArgs, OutputMode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use switch_sync_config::ENV_LOG_LEVEL;
use switch_sync_infra::{InfraError, LogFormat, ObservabilityOptions, redact_if_secret};
use switch_sync_ports::LogLevel;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const ENV_PREFIX: &str = "SWITCH_SYNC_";

#[derive(Debug, Parser)]
#[command(
    name = "switch-sync",
    version,
    about = "Mirror Nintendo Switch captures and files over FTP",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync every enabled target until Ctrl-C.
    Run {
        /// Config file path (JSON/TOML).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run one pass per target and exit.
        #[arg(long)]
        once: bool,
        /// Start syncing even when `settings.autoStart` is false.
        #[arg(long)]
        start: bool,
    },
    /// Config-related commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Show build and version details.
    Info,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Write a starter config file.
    Init {
        /// Destination (defaults to ./switch-sync.toml).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Show the effective config (secrets redacted).
    Show {
        /// Config file path (JSON/TOML).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Optional JSON overrides (partial config).
        #[arg(long)]
        overrides_json: Option<String>,
    },
    /// Validate the effective config and list enabled targets.
    Validate {
        /// Config file path (JSON/TOML).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Optional JSON overrides (partial config).
        #[arg(long)]
        overrides_json: Option<String>,
    },
}

pub(crate) struct CliOutput {
    stdout: String,
    stderr: String,
    exit_code: ExitCode,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let env = collect_scoped_env(ENV_PREFIX);

    match execute(&cli, &env, true) {
        Ok(output) => match write_output(&output) {
            Ok(()) => std::process::ExitCode::from(output.exit_code.as_u8()),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

/// Parse `args` and run the command against an explicit environment.
///
/// Never installs a global tracing subscriber.
#[cfg_attr(not(test), expect(dead_code, reason = "entry point for in-process tests"))]
fn run_with_args<I, T>(args: I, env: &BTreeMap<String, String>) -> Result<CliOutput, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|error| CliError::InvalidInput(error.to_string()))?;
    execute(&cli, env, false)
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    std::process::ExitCode::from(error.exit_code().as_u8())
}

fn execute(
    cli: &Cli,
    env: &BTreeMap<String, String>,
    install_subscriber: bool,
) -> Result<CliOutput, CliError> {
    let mode = OutputMode::from_args(&cli.output);
    let observability = observability_options(&cli.output, env)?;
    if install_subscriber && observability.format == LogFormat::Pretty {
        install_tracing(observability.min_level);
    }

    match &cli.command {
        Commands::Run {
            config,
            once,
            start,
        } => run_sync(
            mode,
            env,
            RunCommandInput {
                config_path: config.as_deref(),
                once: *once,
                start: *start,
            },
            &observability,
        ),
        Commands::Config { command } => match command {
            ConfigCommands::Init { path, force } => run_config_init(mode, path.as_deref(), *force),
            ConfigCommands::Show {
                config,
                overrides_json,
            } => run_config_show(mode, env, config.as_deref(), overrides_json.as_deref()),
            ConfigCommands::Validate {
                config,
                overrides_json,
            } => run_config_validate(mode, env, config.as_deref(), overrides_json.as_deref()),
        },
        Commands::Info => run_info(mode),
    }
}

/// `--log-level` wins over `SWITCH_SYNC_LOG_LEVEL`; both default to info.
fn observability_options(
    args: &OutputArgs,
    env: &BTreeMap<String, String>,
) -> Result<ObservabilityOptions, CliError> {
    let requested = args
        .log_level
        .as_deref()
        .or_else(|| env.get(ENV_LOG_LEVEL).map(String::as_str));
    let min_level = match requested {
        None => LogLevel::Info,
        Some(value) => LogLevel::parse(value)
            .ok_or_else(|| CliError::InvalidInput(format!("unknown log level: {value}")))?,
    };
    let format = match args.log_format {
        Some(LogFormatArg::Pretty) => LogFormat::Pretty,
        Some(LogFormatArg::Json) | None => LogFormat::Json,
    };
    Ok(ObservabilityOptions { format, min_level })
}

fn install_tracing(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
    if installed.is_ok() {
        tracing::debug!(version = env!("CARGO_PKG_VERSION"), "tracing subscriber installed");
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: String,
    message: String,
    kind: String,
    retriable: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, String>,
}

impl ErrorDto {
    fn from_envelope(error: &InfraError) -> Self {
        Self {
            code: format!("{}:{}", error.code.namespace(), error.code.code()),
            message: error.message.clone(),
            kind: error.kind.to_string(),
            retriable: error.class.is_retriable(),
            meta: error
                .metadata
                .iter()
                .map(|(key, value)| (key.clone(), redact_if_secret(key, value)))
                .collect(),
        }
    }
}

pub(crate) fn format_error_output(
    mode: OutputMode,
    error: &InfraError,
    exit_code: ExitCode,
) -> CliOutput {
    let dto = ErrorDto::from_envelope(error);

    let mut stderr = String::new();
    log_info(&mut stderr, "command failed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        let payload = serde_json::json!({
            "type": "error",
            "status": "error",
            "error": dto,
        });
        let mut out = serde_json::to_string(&payload).unwrap_or_else(|_| {
            "{\"type\":\"error\",\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\"}}".to_string()
        });
        out.push('\n');
        out
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": "error",
            "error": dto,
        });

        // This is a CLI boundary, so JSON serialization errors are internal.
        let mut output = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\"}}".to_string()
        });
        output.push('\n');
        output
    } else {
        format_error_text(&dto)
    };

    CliOutput {
        stdout,
        stderr,
        exit_code,
    }
}

fn format_error_text(error: &ErrorDto) -> String {
    let mut out = String::new();
    out.push_str("status: error\n");
    out.push_str("code: ");
    out.push_str(&error.code);
    out.push('\n');
    out.push_str("message: ");
    out.push_str(&error.message);
    out.push('\n');
    out.push_str("kind: ");
    out.push_str(&error.kind);
    out.push('\n');

    if !error.meta.is_empty() {
        out.push_str("meta:\n");
        for (key, value) in &error.meta {
            out.push_str("  ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
    }

    out
}

pub(crate) fn log_info(stderr: &mut String, message: &str, no_progress: bool) {
    if no_progress {
        return;
    }
    stderr.push_str("info: ");
    stderr.push_str(message);
    stderr.push('\n');
}

pub(crate) fn format_ndjson_summary(
    status: &str,
    kind: &str,
    extra: Option<serde_json::Value>,
) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert(
        "type".to_string(),
        serde_json::Value::String("summary".to_string()),
    );
    payload.insert(
        "status".to_string(),
        serde_json::Value::String(status.to_string()),
    );
    payload.insert(
        "kind".to_string(),
        serde_json::Value::String(kind.to_string()),
    );
    if let Some(serde_json::Value::Object(map)) = extra {
        for (key, value) in map {
            payload.insert(key, value);
        }
    }
    let mut out = serde_json::to_string(&serde_json::Value::Object(payload)).unwrap_or_else(|_| {
        "{\"type\":\"summary\",\"status\":\"error\",\"kind\":\"internal\"}".to_string()
    });
    out.push('\n');
    out
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;

    if !output.stderr.is_empty() {
        let mut stderr = io::stderr();
        stderr.write_all(output.stderr.as_bytes())?;
        stderr.flush()?;
    }

    Ok(())
}

fn collect_scoped_env(prefix: &str) -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;
    use switch_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn run(args: &[&str]) -> Result<CliOutput, CliError> {
        let mut argv = vec!["switch-sync"];
        argv.extend_from_slice(args);
        run_with_args(argv, &BTreeMap::new())
    }

    fn write(path: &Path, contents: &str) -> io::Result<String> {
        std::fs::write(path, contents)?;
        Ok(path.to_string_lossy().into_owned())
    }

    #[test]
    fn version_flag_is_supported() {
        let result = Cli::command().try_get_matches_from(["switch-sync", "--version"]);
        let is_version = matches!(
            result,
            Err(error) if error.kind() == clap::error::ErrorKind::DisplayVersion
        );

        assert!(is_version, "expected clap to render version");
    }

    #[test]
    fn exit_codes_for_errors() -> TestResult {
        let io_error = CliError::Io(io::Error::other("io"));
        let serialization_error = match serde_json::from_str::<serde_json::Value>("not-json") {
            Ok(_) => return Err("expected serialization error".into()),
            Err(error) => CliError::Serialization(error),
        };
        let invalid = CliError::InvalidInput("bad".to_owned());

        assert_eq!(io_error.exit_code(), ExitCode::Io);
        assert_eq!(serialization_error.exit_code(), ExitCode::Internal);
        assert_eq!(invalid.exit_code(), ExitCode::InvalidInput);

        let connect = ErrorEnvelope::unexpected(
            ErrorCode::new("remote", "connect_failed"),
            "refused",
            ErrorClass::Retriable,
        );
        assert_eq!(ExitCode::for_envelope(&connect), ExitCode::Io);
        let internal =
            ErrorEnvelope::unexpected(ErrorCode::internal(), "boom", ErrorClass::NonRetriable);
        assert_eq!(ExitCode::for_envelope(&internal), ExitCode::Internal);
        Ok(())
    }

    #[test]
    fn info_json_reports_build() -> TestResult {
        let output = run(&["--output", "json", "info"])?;
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        assert_eq!(value.get("status"), Some(&serde_json::json!("ok")));
        let build = value.get("build").ok_or("missing build")?;
        assert_eq!(build.get("name"), Some(&serde_json::json!("switch-sync-cli")));
        Ok(())
    }

    #[test]
    fn config_init_refuses_to_overwrite_without_force() -> TestResult {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("switch-sync.toml");
        let path = path.to_string_lossy().into_owned();

        let first = run(&["config", "init", "--path", &path])?;
        assert_eq!(first.exit_code, ExitCode::Ok);
        assert!(first.stdout.contains("overwritten: false"));
        let written = std::fs::read_to_string(&path)?;
        assert!(written.contains("checkRateSecs = 15"));

        let second = run(&["config", "init", "--path", &path])?;
        assert_eq!(second.exit_code, ExitCode::InvalidInput);
        assert!(second.stdout.contains("code: core:already_exists"));

        let forced = run(&["config", "init", "--path", &path, "--force"])?;
        assert_eq!(forced.exit_code, ExitCode::Ok);
        assert!(forced.stdout.contains("overwritten: true"));
        Ok(())
    }

    #[test]
    fn config_init_output_validates() -> TestResult {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("switch-sync.json").to_string_lossy().into_owned();
        run(&["config", "init", "--path", &path])?;

        let output = run(&["config", "validate", "--config", &path])?;
        assert_eq!(output.exit_code, ExitCode::Ok);
        assert!(output.stdout.contains("targets: 0"));
        Ok(())
    }

    #[test]
    fn config_show_redacts_password() -> TestResult {
        let temp = tempfile::tempdir()?;
        let path = write(
            &temp.path().join("switch-sync.json"),
            r#"{ "server": { "host": "10.0.0.2", "password": "hunter2" } }"#,
        )?;
        let output = run(&["--output", "json", "config", "show", "--config", &path])?;
        assert_eq!(output.exit_code, ExitCode::Ok);
        assert!(!output.stdout.contains("hunter2"));
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        let host = value
            .get("effectiveConfig")
            .and_then(|config| config.get("server"))
            .and_then(|server| server.get("host"));
        assert_eq!(host, Some(&serde_json::json!("10.0.0.2")));
        Ok(())
    }

    #[test]
    fn invalid_config_exits_with_invalid_input() -> TestResult {
        let temp = tempfile::tempdir()?;
        let path = write(
            &temp.path().join("switch-sync.json"),
            r#"{ "settings": { "checkRateSecs": 0 } }"#,
        )?;
        let output = run(&["--output", "ndjson", "config", "validate", "--config", &path])?;
        assert_eq!(output.exit_code, ExitCode::InvalidInput);
        let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
        assert_eq!(value.get("type"), Some(&serde_json::json!("error")));
        Ok(())
    }

    #[test]
    fn run_without_targets_is_rejected() -> TestResult {
        let output = run(&["run", "--once"])?;
        assert_eq!(output.exit_code, ExitCode::InvalidInput);
        assert!(output.stdout.contains("code: sync:no_targets"));
        Ok(())
    }

    #[test]
    fn run_requires_start_when_auto_start_is_off() -> TestResult {
        let temp = tempfile::tempdir()?;
        let config = serde_json::json!({
            "server": { "host": "10.0.0.2" },
            "fileSync": [{ "serverPath": "/saves", "outputPath": temp.path().join("out") }],
        });
        let path = write(&temp.path().join("switch-sync.json"), &config.to_string())?;

        let output = run(&["run", "--config", &path])?;
        assert_eq!(output.exit_code, ExitCode::InvalidInput);
        assert!(output.stdout.contains("code: sync:not_started"));
        Ok(())
    }

    #[test]
    fn log_level_flag_overrides_env() -> TestResult {
        let cli = Cli::try_parse_from(["switch-sync", "--log-level", "warn", "info"])?;
        let env = BTreeMap::from([(ENV_LOG_LEVEL.to_owned(), "debug".to_owned())]);
        let options = observability_options(&cli.output, &env)?;
        assert_eq!(options.min_level, LogLevel::Warn);
        assert_eq!(options.format, LogFormat::Json);

        let cli = Cli::try_parse_from(["switch-sync", "--log-format", "pretty", "info"])?;
        let options = observability_options(&cli.output, &env)?;
        assert_eq!(options.min_level, LogLevel::Debug);
        assert_eq!(options.format, LogFormat::Pretty);
        Ok(())
    }

    #[test]
    fn unknown_log_level_is_invalid_input() -> TestResult {
        let result = run(&["--log-level", "chatty", "info"]);
        assert!(matches!(result, Err(CliError::InvalidInput(_))));
        Ok(())
    }
}

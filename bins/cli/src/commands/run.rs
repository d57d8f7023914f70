//! `run` command handler.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ndjson_summary, log_info};
use std::collections::BTreeMap;
use std::path::Path;
use switch_sync_infra::{
    ObservabilityOptions, TargetPassResult, build_logger, load_effective_config,
    run_once_blocking, run_until_ctrl_c,
};
use switch_sync_shared::{ErrorCode, ErrorEnvelope};

/// Flags of the `run` command.
#[derive(Debug, Clone, Copy)]
pub struct RunCommandInput<'a> {
    pub config_path: Option<&'a Path>,
    pub once: bool,
    pub start: bool,
}

/// Load the config, then sync once or until Ctrl-C. SIGHUP re-reads the same
/// config sources.
pub fn run_sync(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    input: RunCommandInput<'_>,
    observability: &ObservabilityOptions,
) -> Result<CliOutput, CliError> {
    let config = match load_effective_config(env, input.config_path, None) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::InvalidInput)),
    };
    let logger = build_logger(observability);

    if input.once {
        return match run_once_blocking(&config, logger) {
            Ok(results) => format_pass_results(mode, &results),
            Err(error) => {
                let exit_code = ExitCode::for_envelope(&error);
                Ok(format_error_output(mode, &error, exit_code))
            },
        };
    }

    if !input.start && !config.settings.auto_start {
        let error = ErrorEnvelope::expected(
            ErrorCode::new("sync", "not_started"),
            "settings.autoStart is false; pass --start to begin syncing",
        );
        return Ok(format_error_output(mode, &error, ExitCode::InvalidInput));
    }

    let reload = || load_effective_config(env, input.config_path, None);
    if let Err(error) = run_until_ctrl_c(&config, logger, reload) {
        let exit_code = ExitCode::for_envelope(&error);
        return Ok(format_error_output(mode, &error, exit_code));
    }

    let mut stderr = String::new();
    log_info(&mut stderr, "sync stopped", mode.no_progress);
    let stdout = if mode.is_ndjson() {
        format_ndjson_summary("ok", "run", None)
    } else if mode.is_json() {
        let mut output = serde_json::to_string_pretty(&serde_json::json!({ "status": "ok" }))?;
        output.push('\n');
        output
    } else {
        "status: ok\nsync: stopped\n".to_owned()
    };
    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Every target that could not open a session turns the run into a partial
/// success with the I/O exit code.
fn format_pass_results(
    mode: OutputMode,
    results: &[TargetPassResult],
) -> Result<CliOutput, CliError> {
    let all_ok = results.iter().all(|result| result.error.is_none());
    let (status, exit_code) = if all_ok {
        ("ok", ExitCode::Ok)
    } else {
        ("partial", ExitCode::Io)
    };

    let stdout = if mode.is_ndjson() {
        let mut out = String::new();
        for result in results {
            let mut line = serde_json::to_value(result)?;
            if let Some(object) = line.as_object_mut() {
                object.insert("type".to_owned(), serde_json::json!("target"));
            }
            out.push_str(&serde_json::to_string(&line)?);
            out.push('\n');
        }
        out.push_str(&format_ndjson_summary(
            status,
            "runOnce",
            Some(serde_json::json!({ "targets": results.len() })),
        ));
        out
    } else if mode.is_json() {
        let mut output = serde_json::to_string_pretty(&serde_json::json!({
            "status": status,
            "targets": results,
        }))?;
        output.push('\n');
        output
    } else {
        format_pass_results_text(status, results)
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code,
    })
}

fn format_pass_results_text(status: &str, results: &[TargetPassResult]) -> String {
    let mut out = format!("status: {status}\n");
    for result in results {
        match (&result.report, &result.error) {
            (Some(report), _) => out.push_str(&format!(
                "{}: new={} updated={} unchanged={} failed={} skippedDirs={} bytes={} elapsedMs={}\n",
                result.target.as_str(),
                report.new,
                report.updated,
                report.unchanged,
                report.failed,
                report.skipped_dirs,
                report.bytes,
                report.elapsed_ms,
            )),
            (None, Some(error)) => out.push_str(&format!(
                "{}: error {}:{} {}\n",
                result.target.as_str(),
                error.code.namespace(),
                error.code.code(),
                error.message,
            )),
            (None, None) => out.push_str(&format!("{}: skipped\n", result.target.as_str())),
        }
    }
    out
}

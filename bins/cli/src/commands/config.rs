//! `config show` and `config validate` handlers.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ndjson_summary, log_info};
use std::collections::BTreeMap;
use std::path::Path;
use switch_sync_infra::{ConfigSummary, load_effective_config_json, validate_config};

/// Print the effective config with secrets redacted.
pub fn run_config_show(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<CliOutput, CliError> {
    let config_json = match load_effective_config_json(env, path, overrides_json) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::InvalidInput)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config show completed", mode.no_progress);

    let stdout = if mode.is_json() || mode.is_ndjson() {
        let config_value: serde_json::Value = serde_json::from_str(config_json.trim())?;
        let payload = serde_json::json!({
            "configPath": path.map(|value| value.to_string_lossy().to_string()),
            "effectiveConfig": config_value,
        });
        if mode.is_ndjson() {
            format_ndjson_summary("ok", "configShow", Some(payload))
        } else {
            let mut payload = payload;
            if let Some(object) = payload.as_object_mut() {
                object.insert("status".to_owned(), serde_json::json!("ok"));
            }
            let mut output = serde_json::to_string_pretty(&payload)?;
            output.push('\n');
            output
        }
    } else {
        let mut out = String::new();
        out.push_str("status: ok\nconfig:\n");
        out.push_str(&config_json);
        out
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Validate the effective config and list the targets it enables.
pub fn run_config_validate(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<CliOutput, CliError> {
    let summary = match validate_config(env, path, overrides_json) {
        Ok(summary) => summary,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::InvalidInput)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config validate completed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_summary("ok", "configValidate", Some(serde_json::to_value(&summary)?))
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": "ok",
            "configPath": path.map(|value| value.to_string_lossy().to_string()),
            "summary": summary,
        });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        format_summary_text(path, &summary)
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

fn format_summary_text(path: Option<&Path>, summary: &ConfigSummary) -> String {
    let mut out = String::from("status: ok\nconfig: ok\n");
    if let Some(path) = path {
        out.push_str(&format!("path: {}\n", path.to_string_lossy()));
    }
    out.push_str(&format!(
        "endpoint: {}\nautoStart: {}\ntargets: {}\n",
        summary.endpoint.as_deref().unwrap_or("none"),
        summary.auto_start,
        summary.targets.len()
    ));
    for target in &summary.targets {
        out.push_str(&format!(
            "  {}: {} -> {} every {}s\n",
            target.id.as_str(),
            target.remote_roots.join(", "),
            target.local_root,
            target.poll_interval_secs
        ));
    }
    out
}

//! `config init` command handler.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output};
use std::path::{Path, PathBuf};
use switch_sync_config::{ConfigFormat, DEFAULT_CONFIG_FILE_NAME, default_config_document};
use switch_sync_shared::{ErrorCode, ErrorEnvelope};

/// Write a starter config to `path` (or `./switch-sync.toml`).
pub fn run_config_init(
    mode: OutputMode,
    path: Option<&Path>,
    force: bool,
) -> Result<CliOutput, CliError> {
    let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE_NAME), Path::to_path_buf);
    let overwritten = match write_default_config(&path, force) {
        Ok(overwritten) => overwritten,
        Err(error) => {
            let exit_code = ExitCode::for_envelope(&error);
            return Ok(format_error_output(mode, &error, exit_code));
        },
    };

    let config_path = path.to_string_lossy();
    let stdout = if mode.is_ndjson() {
        let mut out = serde_json::to_string(&serde_json::json!({
            "type": "summary",
            "status": "ok",
            "kind": "configInit",
            "configPath": config_path,
            "overwritten": overwritten,
        }))?;
        out.push('\n');
        out
    } else if mode.is_json() {
        let mut out = serde_json::to_string_pretty(&serde_json::json!({
            "status": "ok",
            "configPath": config_path,
            "overwritten": overwritten,
        }))?;
        out.push('\n');
        out
    } else {
        format!("status: ok\nconfigPath: {config_path}\noverwritten: {overwritten}\n")
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

/// Returns whether an existing file was replaced.
fn write_default_config(path: &Path, force: bool) -> Result<bool, ErrorEnvelope> {
    let exists = path.exists();
    if exists && !force {
        return Err(ErrorEnvelope::expected(
            ErrorCode::already_exists(),
            "config file already exists; pass --force to overwrite",
        )
        .with_metadata("path", path.to_string_lossy().into_owned()));
    }

    let document = default_config_document(ConfigFormat::detect(path)?)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, document)?;
    Ok(exists)
}

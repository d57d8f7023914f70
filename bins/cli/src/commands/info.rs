//! Info command handler.

use crate::CliOutput;
use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use switch_sync_config::DEFAULT_CONFIG_FILE_NAME;
use switch_sync_infra::infra_crate_version;

/// Build-time facts about the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub rust_version: &'static str,
    pub os: &'static str,
    pub arch: &'static str,
    pub profile: &'static str,
}

#[must_use]
pub const fn build_info() -> BuildInfo {
    BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        rust_version: env!("CARGO_PKG_RUST_VERSION"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Run the info command.
pub fn run_info(mode: OutputMode) -> Result<CliOutput, CliError> {
    let build = build_info();
    let infra_version = infra_crate_version();

    let stdout = if mode.is_ndjson() {
        let mut out = serde_json::to_string(&serde_json::json!({
            "type": "summary",
            "status": "ok",
            "kind": "info",
            "build": build_json(&build, infra_version),
        }))?;
        out.push('\n');
        out
    } else if mode.is_json() {
        let mut out = serde_json::to_string_pretty(&serde_json::json!({
            "status": "ok",
            "build": build_json(&build, infra_version),
        }))?;
        out.push('\n');
        out
    } else {
        format!(
            "status: ok\nname: {}\nversion: {}\ninfra: {}\nrustVersion: {}\nplatform: {}-{}\nprofile: {}\ndefaultConfig: {}\n",
            build.name,
            build.version,
            infra_version,
            build.rust_version,
            build.os,
            build.arch,
            build.profile,
            DEFAULT_CONFIG_FILE_NAME,
        )
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

fn build_json(build: &BuildInfo, infra_version: &str) -> serde_json::Value {
    serde_json::json!({
        "name": build.name,
        "version": build.version,
        "infraVersion": infra_version,
        "rustVersion": build.rust_version,
        "os": build.os,
        "arch": build.arch,
        "profile": build.profile,
    })
}

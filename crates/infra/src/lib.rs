//! # switch-sync-infra
//!
//! Infrastructure wiring and runtime composition.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

/// Config loading helpers used by CLI surfaces.
pub mod config_check;
/// Environment validation helpers used by CLI surfaces.
pub mod env_check;
/// Composition root and run loops.
pub mod runtime;

pub use config_check::{
    ConfigSummary, TargetSummary, load_effective_config, load_effective_config_json,
    validate_config,
};
pub use env_check::{InfraError, InfraResult, validate_env_parsing};
pub use runtime::{
    LogFormat, ObservabilityOptions, ReloadedConfig, SyncRuntime, build_logger, ftp_settings,
    run_once_blocking, run_until_ctrl_c, scratch_parent,
};

pub use switch_sync_app::{TargetPassResult, TargetStatus};

// Re-export redaction utilities for CLI boundary sanitization
pub use switch_sync_shared::{is_secret_key, redact_if_secret};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use switch_sync_adapters::adapters_crate_version;
    use switch_sync_app::app_crate_version;
    use switch_sync_config::config_crate_version;
    use switch_sync_shared::shared_crate_version;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]";
                continue;
            }
            if !in_deps {
                continue;
            }
            if line.starts_with("switch-sync-") {
                let key = line.split('=').next().unwrap_or("").trim();
                let name = key.split('.').next().unwrap_or("").trim();
                deps.push(name.to_string());
            }
        }

        deps
    }

    #[test]
    fn infra_depends_on_app_adapters_config() {
        let deps = workspace_deps();
        let required = [
            "switch-sync-app",
            "switch-sync-adapters",
            "switch-sync-config",
        ];

        for expected in required {
            assert!(
                deps.iter().any(|dep| dep == expected),
                "missing dependency: {expected}"
            );
        }
    }

    #[test]
    fn infra_never_depends_on_testkit_at_runtime() {
        assert!(!workspace_deps().iter().any(|dep| dep == "switch-sync-testkit"));
    }

    #[test]
    fn infra_can_use_app_adapters_config_shared() {
        assert!(!infra_crate_version().is_empty());
        assert!(!app_crate_version().is_empty());
        assert!(!adapters_crate_version().is_empty());
        assert!(!config_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}

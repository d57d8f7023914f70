//! # switch-sync-config
//!
//! Configuration schema, validation, and normalization for the sync engine.
//! This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (env + file + overrides).
pub mod load;
/// Configuration schema types and helpers.
pub mod schema;

pub use env::{
    ENV_CHECK_RATE_SECS, ENV_CONNECT_TIMEOUT_MS, ENV_DT_FORMAT, ENV_HOST, ENV_LOG_LEVEL,
    ENV_PASSWORD, ENV_PORT, ENV_SCRATCH_DIR, ENV_SCREENSHOTS_ENABLED,
    ENV_SCREENSHOTS_OUTPUT_PATH, ENV_USER, EnvParseError, SyncEnv, apply_env_overrides,
};
pub use load::{
    ConfigFormat, DEFAULT_CONFIG_FILE_NAME, default_config_document, load_config_from_path,
    load_config_from_sources, load_config_std_env, to_pretty_json, to_pretty_toml,
};
pub use schema::{
    CURRENT_CONFIG_VERSION, ConfigLimits, ConfigSchemaError, DEFAULT_PORT, FileSyncPairConfig,
    MAX_FILE_SYNC_PAIRS, ScreenshotsConfig, ServerConfig, SettingsConfig, SwitchSyncConfig,
    ValidatedSwitchSyncConfig, parse_config_json, parse_config_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use switch_sync_domain::domain_crate_version;
    use switch_sync_shared::shared_crate_version;

    #[test]
    fn config_crate_compiles() {
        let version = config_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn config_can_use_domain_and_shared() {
        let domain_version = domain_crate_version();
        let shared_version = shared_crate_version();

        assert!(!domain_version.is_empty());
        assert!(!shared_version.is_empty());
    }
}

//! Config loading helpers (env + file + overrides).
//!
//! The loader is responsible for deterministic merge order and surfacing
//! user-facing errors as typed `ErrorEnvelope`s.

use crate::schema::{FileSyncPairConfig, SwitchSyncConfig, ValidatedSwitchSyncConfig};
use crate::{SyncEnv, apply_env_overrides};
use serde::Deserialize;
use std::path::Path;
use switch_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, SecretString};

/// File name used by `config init` when no path is given.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "switch-sync.toml";

/// Supported on-disk config formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.json` (also the fallback for extension-less paths).
    Json,
    /// `.toml`.
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a path extension.
    pub fn detect(path: &Path) -> Result<Self, ErrorEnvelope> {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            None | Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            Some(other) => Err(ErrorEnvelope::expected(
                ErrorCode::new("config", "unsupported_format"),
                "unsupported config format; use .json or .toml",
            )
            .with_metadata("extension", other.to_string())),
        }
    }
}

/// Load the config from sources using a deterministic precedence order.
///
/// Precedence (highest wins):
/// - env overrides (`SyncEnv`)
/// - overrides JSON (partial config)
/// - config JSON (file content)
/// - defaults (`SwitchSyncConfig::default()`)
pub fn load_config_from_sources(
    config_json: Option<&str>,
    overrides_json: Option<&str>,
    env: &SyncEnv,
) -> Result<ValidatedSwitchSyncConfig, ErrorEnvelope> {
    let mut config = match config_json {
        None => SwitchSyncConfig::default(),
        Some(input) => parse_config_unvalidated(input, ConfigFormat::Json)?,
    };

    if let Some(input) = overrides_json {
        let overrides = parse_overrides_json(input)?;
        apply_overrides(&mut config, overrides);
    }

    // env is applied last and also validates/normalizes the resulting config.
    apply_env_overrides(config, env)
}

/// Load the config from an optional file path.
pub fn load_config_from_path(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    env: &SyncEnv,
) -> Result<ValidatedSwitchSyncConfig, ErrorEnvelope> {
    let mut config = match config_path {
        None => SwitchSyncConfig::default(),
        Some(path) => {
            let config_text = read_config_file(path)?;
            let format = ConfigFormat::detect(path)?;
            parse_config_unvalidated(&config_text, format)?
        },
    };

    if let Some(input) = overrides_json {
        let overrides = parse_overrides_json(input)?;
        apply_overrides(&mut config, overrides);
    }

    apply_env_overrides(config, env)
}

/// Load the config from std env and an optional file path.
pub fn load_config_std_env(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<ValidatedSwitchSyncConfig, ErrorEnvelope> {
    let env = SyncEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    load_config_from_path(config_path, overrides_json, &env)
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &SwitchSyncConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_json"),
            format!("failed to serialize config: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &SwitchSyncConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Render the starter config written by `config init`, in `format`.
pub fn default_config_document(format: ConfigFormat) -> Result<String, ErrorEnvelope> {
    let mut config = SwitchSyncConfig::default();
    config.file_sync.push(FileSyncPairConfig {
        enabled: false,
        ..FileSyncPairConfig::default()
    });
    match format {
        ConfigFormat::Json => to_pretty_json(&config),
        ConfigFormat::Toml => to_pretty_toml(&config),
    }
}

fn parse_config_unvalidated(
    input: &str,
    format: ConfigFormat,
) -> Result<SwitchSyncConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn parse_overrides_json(input: &str) -> Result<ConfigOverrides, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid overrides JSON: {error}"),
        )
        .with_metadata("source", "overrides")
    })
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct ConfigOverrides {
    version: Option<u32>,
    server: ServerOverrides,
    screenshots: ScreenshotsOverrides,
    file_sync: Option<Vec<FileSyncPairConfig>>,
    settings: SettingsOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct ServerOverrides {
    host: Option<Box<str>>,
    port: Option<u32>,
    user: Option<Box<str>>,
    password: Option<SecretString>,
    connect_timeout_ms: Option<u64>,
    transfer_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct ScreenshotsOverrides {
    enabled: Option<bool>,
    output_path: Option<Box<str>>,
    dt_format: Option<Box<str>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct SettingsOverrides {
    check_rate_secs: Option<u64>,
    scratch_dir: Option<Box<str>>,
    auto_start: Option<bool>,
}

fn apply_overrides(config: &mut SwitchSyncConfig, overrides: ConfigOverrides) {
    let ConfigOverrides {
        version,
        server,
        screenshots,
        file_sync,
        settings,
    } = overrides;

    set(&mut config.version, version);

    set(&mut config.server.host, server.host.map(Some));
    set(&mut config.server.port, server.port);
    set(&mut config.server.user, server.user);
    set(&mut config.server.password, server.password);
    set(&mut config.server.connect_timeout_ms, server.connect_timeout_ms);
    set(
        &mut config.server.transfer_timeout_ms,
        server.transfer_timeout_ms.map(Some),
    );

    set(&mut config.screenshots.enabled, screenshots.enabled);
    set(&mut config.screenshots.output_path, screenshots.output_path);
    set(&mut config.screenshots.dt_format, screenshots.dt_format);

    // Pairs are positional, so a partial list would be ambiguous: replace wholesale.
    set(&mut config.file_sync, file_sync);

    set(&mut config.settings.check_rate_secs, settings.check_rate_secs);
    set(&mut config.settings.scratch_dir, settings.scratch_dir.map(Some));
    set(&mut config.settings.auto_start, settings.auto_start);
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

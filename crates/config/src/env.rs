//! Environment variable parsing and env-to-config merging.
//!
//! Env parsing is strict (invalid values fail fast) and safe (secret values
//! are redacted in error metadata).

use crate::schema::{SwitchSyncConfig, ValidatedSwitchSyncConfig};
use std::collections::BTreeMap;
use std::fmt;
use switch_sync_shared::{ErrorCode, ErrorEnvelope, SecretString, redact_if_secret};

/// Env var: server host.
pub const ENV_HOST: &str = "SWITCH_SYNC_HOST";
/// Env var: server port.
pub const ENV_PORT: &str = "SWITCH_SYNC_PORT";
/// Env var: login user.
pub const ENV_USER: &str = "SWITCH_SYNC_USER";
/// Env var: login password (secret).
pub const ENV_PASSWORD: &str = "SWITCH_SYNC_PASSWORD";
/// Env var: poll interval in seconds.
pub const ENV_CHECK_RATE_SECS: &str = "SWITCH_SYNC_CHECK_RATE_SECS";
/// Env var: connect timeout in milliseconds.
pub const ENV_CONNECT_TIMEOUT_MS: &str = "SWITCH_SYNC_CONNECT_TIMEOUT_MS";
/// Env var: enable the screenshots target.
pub const ENV_SCREENSHOTS_ENABLED: &str = "SWITCH_SYNC_SCREENSHOTS_ENABLED";
/// Env var: screenshots output directory.
pub const ENV_SCREENSHOTS_OUTPUT_PATH: &str = "SWITCH_SYNC_SCREENSHOTS_OUTPUT_PATH";
/// Env var: capture rename pattern.
pub const ENV_DT_FORMAT: &str = "SWITCH_SYNC_DT_FORMAT";
/// Env var: parent directory for the scratch directory.
pub const ENV_SCRATCH_DIR: &str = "SWITCH_SYNC_SCRATCH_DIR";
/// Env var: minimum log level.
pub const ENV_LOG_LEVEL: &str = "SWITCH_SYNC_LOG_LEVEL";

const ALL_ENV_VARS: [&str; 11] = [
    ENV_HOST,
    ENV_PORT,
    ENV_USER,
    ENV_PASSWORD,
    ENV_CHECK_RATE_SECS,
    ENV_CONNECT_TIMEOUT_MS,
    ENV_SCREENSHOTS_ENABLED,
    ENV_SCREENSHOTS_OUTPUT_PATH,
    ENV_DT_FORMAT,
    ENV_SCRATCH_DIR,
    ENV_LOG_LEVEL,
];

/// Parsed env overrides. `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncEnv {
    /// Server host.
    pub host: Option<Box<str>>,
    /// Server port.
    pub port: Option<u32>,
    /// Login user.
    pub user: Option<Box<str>>,
    /// Login password.
    pub password: Option<SecretString>,
    /// Poll interval in seconds.
    pub check_rate_secs: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Enable the screenshots target.
    pub screenshots_enabled: Option<bool>,
    /// Screenshots output directory.
    pub screenshots_output_path: Option<Box<str>>,
    /// Capture rename pattern.
    pub dt_format: Option<Box<str>>,
    /// Scratch directory override.
    pub scratch_dir: Option<Box<str>>,
    /// Minimum log level (consumed by the CLI, not part of the config file).
    pub log_level: Option<Box<str>>,
}

impl SyncEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            host: parse_optional_trimmed_string(map, ENV_HOST)?,
            port: parse_optional_u32(map, ENV_PORT)?,
            user: parse_optional_trimmed_string(map, ENV_USER)?,
            password: parse_optional_secret(map, ENV_PASSWORD)?,
            check_rate_secs: parse_optional_u64(map, ENV_CHECK_RATE_SECS)?,
            connect_timeout_ms: parse_optional_u64(map, ENV_CONNECT_TIMEOUT_MS)?,
            screenshots_enabled: parse_optional_bool(map, ENV_SCREENSHOTS_ENABLED)?,
            screenshots_output_path: parse_optional_trimmed_string(
                map,
                ENV_SCREENSHOTS_OUTPUT_PATH,
            )?,
            dt_format: parse_optional_trimmed_string(map, ENV_DT_FORMAT)?,
            scratch_dir: parse_optional_trimmed_string(map, ENV_SCRATCH_DIR)?,
            log_level: parse_optional_trimmed_string(map, ENV_LOG_LEVEL)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let mut map = BTreeMap::new();
        for name in ALL_ENV_VARS {
            if let Ok(value) = std::env::var(name) {
                map.insert(name.to_string(), value);
            }
        }
        Self::from_map(&map)
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: SwitchSyncConfig,
    env: &SyncEnv,
) -> Result<ValidatedSwitchSyncConfig, ErrorEnvelope> {
    let mut config = base;

    set_clone(&mut config.server.host, env.host.clone().map(Some));
    set_clone(&mut config.server.port, env.port);
    set_clone(&mut config.server.user, env.user.clone());
    set_clone(&mut config.server.password, env.password.clone());
    set_clone(&mut config.server.connect_timeout_ms, env.connect_timeout_ms);
    set_clone(&mut config.settings.check_rate_secs, env.check_rate_secs);
    set_clone(&mut config.settings.scratch_dir, env.scratch_dir.clone().map(Some));
    set_clone(&mut config.screenshots.enabled, env.screenshots_enabled);
    set_clone(
        &mut config.screenshots.output_path,
        env.screenshots_output_path.clone(),
    );
    set_clone(&mut config.screenshots.dt_format, env.dt_format.clone());

    config.validate_and_normalize().map_err(Into::into)
}

fn set_clone<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

/// Typed env parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// A secret env var was present but empty after trimming.
    EmptySecret {
        /// Env var name.
        var: &'static str,
    },
    /// Boolean env var had an invalid value.
    InvalidBool {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Integer env var had an invalid value.
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } | Self::EmptySecret { .. } => {
                ErrorCode::new("config", "empty_env_var")
            },
            Self::InvalidBool { .. } => ErrorCode::new("config", "invalid_env_bool"),
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } | Self::EmptySecret { var } => {
                write!(formatter, "{var} must be non-empty")
            },
            Self::InvalidBool { var, .. } => write!(formatter, "{var} must be a boolean"),
            Self::InvalidInt { var, .. } => write!(formatter, "{var} must be an integer"),
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            EnvParseError::EmptyValue { var } | EnvParseError::EmptySecret { var } => {
                envelope.with_metadata("env_var", var)
            },
            EnvParseError::InvalidBool { var, value } | EnvParseError::InvalidInt { var, value } => {
                envelope
                    .with_metadata("env_var", var)
                    .with_metadata("value", redact_if_secret(var, &value))
            },
        }
    }
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    Ok(Some(trimmed.to_owned().into_boxed_str()))
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    // Passwords may legitimately carry surrounding whitespace; only reject
    // values that are blank.
    if raw.trim().is_empty() {
        return Err(EnvParseError::EmptySecret { var });
    }

    Ok(Some(SecretString::new(raw.clone())))
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_u32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u32>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_bool(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<bool>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        "" => Err(EnvParseError::EmptyValue { var }),
        _ => Err(EnvParseError::InvalidBool {
            var,
            value: raw.clone(),
        }),
    }
}

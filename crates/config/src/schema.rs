//! Sync configuration schema, defaults, validation, and normalization.
//!
//! - Deserialization uses `serde` (JSON or TOML).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Normalization trims strings and canonicalizes remote paths so derived
//!   targets are stable across reloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use switch_sync_domain::{
    DEFAULT_SCREENSHOT_PATTERN, RemotePath, SyncTarget, validate_timestamp_pattern,
};
use switch_sync_shared::{BoundedU32, BoundedU64, ErrorCode, ErrorEnvelope, SecretString};

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Maximum number of file-sync pairs.
pub const MAX_FILE_SYNC_PAIRS: usize = 5;

/// Default control port of the homebrew FTP server.
pub const DEFAULT_PORT: u32 = 5000;

const PORT_MIN: u32 = 1;
const PORT_MAX: u32 = 65_535;
const CHECK_RATE_MIN_SECS: u64 = 1;
const CHECK_RATE_MAX_SECS: u64 = 86_400;
const CHECK_RATE_DEFAULT_SECS: u64 = 15;
const CONNECT_TIMEOUT_MIN_MS: u64 = 100;
const CONNECT_TIMEOUT_MAX_MS: u64 = 300_000;
const CONNECT_TIMEOUT_DEFAULT_MS: u64 = 10_000;
const TRANSFER_TIMEOUT_MIN_MS: u64 = 100;
const TRANSFER_TIMEOUT_MAX_MS: u64 = 86_400_000;

/// Top-level sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SwitchSyncConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// FTP server connection settings.
    pub server: ServerConfig,
    /// Album capture target.
    pub screenshots: ScreenshotsConfig,
    /// Generic remote/local mirror pairs.
    pub file_sync: Vec<FileSyncPairConfig>,
    /// Scheduler settings.
    pub settings: SettingsConfig,
}

impl Default for SwitchSyncConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            server: ServerConfig::default(),
            screenshots: ScreenshotsConfig::default(),
            file_sync: Vec::new(),
            settings: SettingsConfig::default(),
        }
    }
}

/// FTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Host name or IP address of the console.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Box<str>>,
    /// Control port.
    pub port: u32,
    /// Login user.
    pub user: Box<str>,
    /// Login password. Redacted when serialized.
    pub password: SecretString,
    /// Bound on connect + login.
    pub connect_timeout_ms: u64,
    /// Optional bound on one file retrieval. Unset means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            user: "root".into(),
            password: SecretString::default(),
            connect_timeout_ms: CONNECT_TIMEOUT_DEFAULT_MS,
            transfer_timeout_ms: None,
        }
    }
}

/// Album capture target settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ScreenshotsConfig {
    /// Whether the target runs.
    pub enabled: bool,
    /// Local directory receiving captures.
    pub output_path: Box<str>,
    /// strftime pattern for renamed captures.
    pub dt_format: Box<str>,
}

impl Default for ScreenshotsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_path: "".into(),
            dt_format: DEFAULT_SCREENSHOT_PATTERN.into(),
        }
    }
}

/// One remote/local mirror pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct FileSyncPairConfig {
    /// Absolute remote directory.
    pub server_path: Box<str>,
    /// Local mirror directory.
    pub output_path: Box<str>,
    /// Whether the pair runs.
    pub enabled: bool,
}

impl Default for FileSyncPairConfig {
    fn default() -> Self {
        Self {
            server_path: "".into(),
            output_path: "".into(),
            enabled: true,
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SettingsConfig {
    /// Seconds between cycle starts for every target.
    pub check_rate_secs: u64,
    /// Parent for the `switch_ftp_sync` scratch directory (defaults to the
    /// temp dir). Only that child is ever purged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<Box<str>>,
    /// Begin syncing as soon as `run` starts.
    pub auto_start: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            check_rate_secs: CHECK_RATE_DEFAULT_SECS,
            scratch_dir: None,
            auto_start: false,
        }
    }
}

impl SwitchSyncConfig {
    /// Validate and normalize the config, producing bounded values.
    pub fn validate_and_normalize(mut self) -> Result<ValidatedSwitchSyncConfig, ConfigSchemaError> {
        self.validate_version()?;
        self.normalize();

        let limits = ConfigLimits::new(&self)?;
        self.screenshots.validate()?;
        self.validate_file_sync()?;
        self.validate_host()?;

        Ok(ValidatedSwitchSyncConfig { raw: self, limits })
    }

    const fn validate_version(&self) -> Result<(), ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.server.host = trim_optional(self.server.host.take());
        self.server.user = self.server.user.trim().into();
        self.screenshots.output_path = self.screenshots.output_path.trim().into();
        for pair in &mut self.file_sync {
            pair.output_path = pair.output_path.trim().into();
            let trimmed = pair.server_path.trim();
            pair.server_path = match RemotePath::parse(trimmed) {
                Ok(path) => path.as_str().into(),
                Err(_) => trimmed.into(),
            };
        }
        self.settings.scratch_dir = trim_optional(self.settings.scratch_dir.take());
    }

    fn validate_file_sync(&self) -> Result<(), ConfigSchemaError> {
        if self.file_sync.len() > MAX_FILE_SYNC_PAIRS {
            return Err(ConfigSchemaError::TooManyFileSyncPairs {
                len: self.file_sync.len(),
                max: MAX_FILE_SYNC_PAIRS,
            });
        }

        for (position, pair) in self.file_sync.iter().enumerate() {
            let index = position + 1;
            if !pair.enabled {
                continue;
            }
            if pair.server_path.is_empty() {
                return Err(ConfigSchemaError::MissingPath {
                    section: "fileSync",
                    field: "serverPath",
                    index: Some(index),
                });
            }
            if pair.output_path.is_empty() {
                return Err(ConfigSchemaError::MissingPath {
                    section: "fileSync",
                    field: "outputPath",
                    index: Some(index),
                });
            }
            if RemotePath::parse(&pair.server_path).is_err() {
                return Err(ConfigSchemaError::RelativeServerPath {
                    index,
                    path: pair.server_path.to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate_host(&self) -> Result<(), ConfigSchemaError> {
        if self.server.host.is_none() && self.has_enabled_target() {
            return Err(ConfigSchemaError::MissingHost);
        }
        Ok(())
    }

    /// Returns true when at least one target would run.
    #[must_use]
    pub fn has_enabled_target(&self) -> bool {
        self.screenshots.enabled || self.file_sync.iter().any(|pair| pair.enabled)
    }
}

impl ScreenshotsConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_timestamp_pattern(&self.dt_format).map_err(|_| {
            ConfigSchemaError::InvalidDtFormat {
                pattern: self.dt_format.to_string(),
            }
        })?;
        if self.enabled && self.output_path.is_empty() {
            return Err(ConfigSchemaError::MissingPath {
                section: "screenshots",
                field: "outputPath",
                index: None,
            });
        }
        Ok(())
    }
}

fn trim_optional(value: Option<Box<str>>) -> Option<Box<str>> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(String::into_boxed_str)
}

/// Bounded numeric settings derived from a validated config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigLimits {
    /// Control port.
    pub port: BoundedU32<PORT_MIN, PORT_MAX>,
    /// Poll interval in seconds.
    pub check_rate_secs: BoundedU64<CHECK_RATE_MIN_SECS, CHECK_RATE_MAX_SECS>,
    /// Connect + login bound in milliseconds.
    pub connect_timeout_ms: BoundedU64<CONNECT_TIMEOUT_MIN_MS, CONNECT_TIMEOUT_MAX_MS>,
    /// Optional per-file transfer bound in milliseconds.
    pub transfer_timeout_ms: Option<BoundedU64<TRANSFER_TIMEOUT_MIN_MS, TRANSFER_TIMEOUT_MAX_MS>>,
}

impl ConfigLimits {
    fn new(config: &SwitchSyncConfig) -> Result<Self, ConfigSchemaError> {
        let port = BoundedU32::try_new(config.server.port).map_err(|error| {
            ConfigSchemaError::LimitOutOfRange {
                section: "server",
                field: "port",
                value: u64::from(error.value),
                min: u64::from(error.min),
                max: u64::from(error.max),
            }
        })?;
        let check_rate_secs = BoundedU64::try_new(config.settings.check_rate_secs).map_err(
            |error| ConfigSchemaError::LimitOutOfRange {
                section: "settings",
                field: "checkRateSecs",
                value: error.value,
                min: error.min,
                max: error.max,
            },
        )?;
        let connect_timeout_ms = BoundedU64::try_new(config.server.connect_timeout_ms).map_err(
            |error| ConfigSchemaError::TimeoutOutOfRange {
                section: "server",
                field: "connectTimeoutMs",
                value_ms: error.value,
                min_ms: error.min,
                max_ms: error.max,
            },
        )?;
        let transfer_timeout_ms = config
            .server
            .transfer_timeout_ms
            .map(BoundedU64::try_new)
            .transpose()
            .map_err(|error| ConfigSchemaError::TimeoutOutOfRange {
                section: "server",
                field: "transferTimeoutMs",
                value_ms: error.value,
                min_ms: error.min,
                max_ms: error.max,
            })?;

        Ok(Self {
            port,
            check_rate_secs,
            connect_timeout_ms,
            transfer_timeout_ms,
        })
    }
}

/// Validated config wrapper carrying bounded numeric values.
#[derive(Debug, Clone)]
pub struct ValidatedSwitchSyncConfig {
    raw: SwitchSyncConfig,
    limits: ConfigLimits,
}

impl ValidatedSwitchSyncConfig {
    /// Access validated numeric bounds.
    #[must_use]
    pub const fn limits(&self) -> &ConfigLimits {
        &self.limits
    }

    /// Borrow the raw config.
    #[must_use]
    pub const fn as_ref(&self) -> &SwitchSyncConfig {
        &self.raw
    }

    /// Consume and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> SwitchSyncConfig {
        self.raw
    }

    /// Interval between cycle starts.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.limits.check_rate_secs.get())
    }

    /// Connect + login bound.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.connect_timeout_ms.get())
    }

    /// Optional per-file transfer bound.
    #[must_use]
    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.limits
            .transfer_timeout_ms
            .map(|value| Duration::from_millis(value.get()))
    }

    /// `host:port` of the configured server, when a host is set.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.raw
            .server
            .host
            .as_deref()
            .map(|host| format!("{host}:{}", self.limits.port.get()))
    }

    /// Build the enabled sync targets in a stable order: screenshots first,
    /// then file-sync pairs in configuration order.
    #[must_use]
    pub fn sync_targets(&self) -> Vec<SyncTarget> {
        let interval = self.poll_interval();
        let mut targets = Vec::new();

        if self.raw.screenshots.enabled {
            targets.push(SyncTarget::screenshots(
                PathBuf::from(self.raw.screenshots.output_path.as_ref()),
                self.raw.screenshots.dt_format.to_string(),
                interval,
            ));
        }

        for (position, pair) in self.raw.file_sync.iter().enumerate() {
            if !pair.enabled {
                continue;
            }
            // Validation guarantees enabled pairs carry absolute server paths.
            let Ok(remote_root) = RemotePath::parse(&pair.server_path) else {
                continue;
            };
            targets.push(SyncTarget::file_sync(
                position + 1,
                remote_root,
                PathBuf::from(pair.output_path.as_ref()),
                interval,
            ));
        }

        targets
    }
}

impl std::ops::Deref for ValidatedSwitchSyncConfig {
    type Target = SwitchSyncConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Parse and validate a JSON config document.
pub fn parse_config_json(input: &str) -> Result<ValidatedSwitchSyncConfig, ErrorEnvelope> {
    let config: SwitchSyncConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;
    config.validate_and_normalize().map_err(Into::into)
}

/// Parse and validate a TOML config document.
pub fn parse_config_toml(input: &str) -> Result<ValidatedSwitchSyncConfig, ErrorEnvelope> {
    let config: SwitchSyncConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;
    config.validate_and_normalize().map_err(Into::into)
}

/// Typed config validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSchemaError {
    /// The config version is not supported by this binary.
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version supported by this crate.
        supported: u32,
    },
    /// A timeout value is out of bounds.
    TimeoutOutOfRange {
        /// Schema section (e.g. `server`).
        section: &'static str,
        /// Field name in the config file (e.g. `connectTimeoutMs`).
        field: &'static str,
        /// Value provided (ms).
        value_ms: u64,
        /// Minimum allowed value (ms).
        min_ms: u64,
        /// Maximum allowed value (ms).
        max_ms: u64,
    },
    /// A numeric limit is out of bounds.
    LimitOutOfRange {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Value provided.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
    /// More file-sync pairs than supported.
    TooManyFileSyncPairs {
        /// Number of pairs provided.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// An enabled target is missing a path.
    MissingPath {
        /// Schema section.
        section: &'static str,
        /// Field name.
        field: &'static str,
        /// 1-based pair index for `fileSync`.
        index: Option<usize>,
    },
    /// A file-sync server path is not absolute.
    RelativeServerPath {
        /// 1-based pair index.
        index: usize,
        /// Path as configured.
        path: String,
    },
    /// The capture rename pattern is not a valid strftime pattern.
    InvalidDtFormat {
        /// Pattern as configured.
        pattern: String,
    },
    /// A target is enabled but no server host is configured.
    MissingHost,
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::TimeoutOutOfRange { .. } => ErrorCode::new("config", "invalid_timeout"),
            Self::LimitOutOfRange { .. } => ErrorCode::new("config", "invalid_limit"),
            Self::TooManyFileSyncPairs { .. } => ErrorCode::new("config", "too_many_pairs"),
            Self::MissingPath { .. } => ErrorCode::new("config", "missing_path"),
            Self::RelativeServerPath { .. } => ErrorCode::new("config", "invalid_server_path"),
            Self::InvalidDtFormat { .. } => ErrorCode::new("config", "invalid_dt_format"),
            Self::MissingHost => ErrorCode::new("config", "missing_host"),
        }
    }
}

impl fmt::Display for ConfigSchemaError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, supported } => write!(
                formatter,
                "unsupported config version {found} (supported: {supported})"
            ),
            Self::TimeoutOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => write!(
                formatter,
                "{section}.{field} must be between {min_ms} and {max_ms} ms (got {value_ms})"
            ),
            Self::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => write!(
                formatter,
                "{section}.{field} must be between {min} and {max} (got {value})"
            ),
            Self::TooManyFileSyncPairs { len, max } => {
                write!(formatter, "fileSync has {len} pairs (max {max})")
            },
            Self::MissingPath {
                section,
                field,
                index: Some(index),
            } => write!(formatter, "{section}[{index}].{field} is required when enabled"),
            Self::MissingPath {
                section,
                field,
                index: None,
            } => write!(formatter, "{section}.{field} is required when enabled"),
            Self::RelativeServerPath { index, .. } => {
                write!(formatter, "fileSync[{index}].serverPath must start with '/'")
            },
            Self::InvalidDtFormat { .. } => {
                formatter.write_str("screenshots.dtFormat is not a valid strftime pattern")
            },
            Self::MissingHost => {
                formatter.write_str("server.host is required when any target is enabled")
            },
        }
    }
}

impl std::error::Error for ConfigSchemaError {}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let envelope = Self::expected(code, message);

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::TimeoutOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value_ms", value_ms.to_string())
                .with_metadata("min_ms", min_ms.to_string())
                .with_metadata("max_ms", max_ms.to_string()),
            ConfigSchemaError::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string())
                .with_metadata("min", min.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::TooManyFileSyncPairs { len, max } => envelope
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::MissingPath {
                section,
                field,
                index,
            } => {
                let envelope = envelope
                    .with_metadata("section", section)
                    .with_metadata("field", field);
                match index {
                    Some(index) => envelope.with_metadata("index", index.to_string()),
                    None => envelope,
                }
            },
            ConfigSchemaError::RelativeServerPath { index, path } => envelope
                .with_metadata("index", index.to_string())
                .with_metadata("path", path),
            ConfigSchemaError::InvalidDtFormat { pattern } => {
                envelope.with_metadata("pattern", pattern)
            },
            ConfigSchemaError::MissingHost => envelope.with_metadata("section", "server"),
        }
    }
}

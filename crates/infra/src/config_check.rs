//! Config loading helpers for CLI surfaces.

use crate::InfraResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use switch_sync_config::{
    SyncEnv, ValidatedSwitchSyncConfig, load_config_from_path, to_pretty_json,
};
use switch_sync_domain::{SyncTarget, TargetId, TargetKind};
use switch_sync_shared::ErrorEnvelope;

/// Load and validate the effective config from an explicit env map.
pub fn load_effective_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<ValidatedSwitchSyncConfig> {
    let env = SyncEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    load_config_from_path(config_path, overrides_json, &env)
}

/// Load and validate the effective config, returning deterministic pretty JSON.
///
/// The password is redacted by its serializer.
pub fn load_effective_config_json(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<String> {
    let config = load_effective_config(env, config_path, overrides_json)?;
    to_pretty_json(&config)
}

/// One derived sync target, as reported by `config validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    /// Target id.
    pub id: TargetId,
    /// Content kind.
    pub kind: TargetKind,
    /// Remote roots walked in order.
    pub remote_roots: Vec<String>,
    /// Local mirror root.
    pub local_root: String,
    /// Seconds between cycle starts.
    pub poll_interval_secs: u64,
}

impl From<&SyncTarget> for TargetSummary {
    fn from(target: &SyncTarget) -> Self {
        Self {
            id: target.id.clone(),
            kind: target.kind,
            remote_roots: target
                .remote_roots
                .iter()
                .map(|root| root.as_str().to_owned())
                .collect(),
            local_root: target.local_root.display().to_string(),
            poll_interval_secs: target.poll_interval.as_secs(),
        }
    }
}

/// Result of validating a config: the server endpoint and the targets it enables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    /// `host:port`, when a host is configured.
    pub endpoint: Option<String>,
    /// Whether `run` starts syncing without `--start`.
    pub auto_start: bool,
    /// Enabled targets in scheduling order.
    pub targets: Vec<TargetSummary>,
}

impl ConfigSummary {
    /// Summarize a validated config.
    #[must_use]
    pub fn of(config: &ValidatedSwitchSyncConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            auto_start: config.settings.auto_start,
            targets: config.sync_targets().iter().map(TargetSummary::from).collect(),
        }
    }
}

/// Load, validate, and summarize the effective config.
pub fn validate_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<ConfigSummary> {
    let config = load_effective_config(env, config_path, overrides_json)?;
    Ok(ConfigSummary::of(&config))
}

//! Environment validation helpers for CLI surfaces.

use std::collections::BTreeMap;
use switch_sync_config::{SwitchSyncConfig, SyncEnv, apply_env_overrides};
use switch_sync_shared::ErrorEnvelope;

/// Infra-level error type (shared error envelope).
pub type InfraError = ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Validate that the provided env overrides parse and merge into the default config.
pub fn validate_env_parsing(env: &BTreeMap<String, String>) -> InfraResult<()> {
    let parsed = SyncEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    let _ = apply_env_overrides(SwitchSyncConfig::default(), &parsed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switch_sync_config::{ENV_CHECK_RATE_SECS, ENV_PORT};

    #[test]
    fn empty_env_is_valid() -> InfraResult<()> {
        validate_env_parsing(&BTreeMap::new())
    }

    #[test]
    fn unparsable_port_is_rejected() {
        let env = BTreeMap::from([(ENV_PORT.to_owned(), "ftp".to_owned())]);
        assert!(validate_env_parsing(&env).is_err());
    }

    #[test]
    fn out_of_range_rate_is_rejected() {
        let env = BTreeMap::from([(ENV_CHECK_RATE_SECS.to_owned(), "0".to_owned())]);
        let error = validate_env_parsing(&env).err();
        assert!(error.is_some());
    }
}

//! Integration tests for env parsing and env-to-config merging.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use switch_sync_config::{EnvParseError, SwitchSyncConfig, SyncEnv, apply_env_overrides};
use switch_sync_domain::{RenameRule, TargetKind};
use switch_sync_shared::{ErrorCode, ErrorEnvelope};

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn read_env_map(relative: &str) -> Result<BTreeMap<String, String>, Box<dyn Error>> {
    let path = workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join(relative);
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[test]
fn env_fixtures_merge_into_effective_config() -> Result<(), Box<dyn Error>> {
    let env_map = read_env_map("env/switch-sync-env.valid.json")?;
    let env = SyncEnv::from_map(&env_map)?;

    let config = apply_env_overrides(SwitchSyncConfig::default(), &env)?;

    assert_eq!(config.endpoint().as_deref(), Some("10.0.0.7:5001"));
    assert_eq!(config.server.password.expose(), "hunter2");
    assert_eq!(config.settings.check_rate_secs, 20);

    let targets = config.sync_targets();
    let screenshots = targets
        .first()
        .ok_or_else(|| std::io::Error::other("missing screenshots target"))?;
    assert_eq!(screenshots.kind, TargetKind::Screenshots);
    assert_eq!(screenshots.local_root, PathBuf::from("/srv/captures"));
    assert_eq!(
        screenshots.rename_rule,
        Some(RenameRule::CaptureTimestamp {
            pattern: "%Y%m%d-%H%M%S".to_owned()
        })
    );
    Ok(())
}

#[test]
fn invalid_env_fixture_is_rejected() -> Result<(), Box<dyn Error>> {
    let env_map = read_env_map("env/switch-sync-env.invalid.json")?;
    let error = SyncEnv::from_map(&env_map).err();
    assert!(matches!(error, Some(EnvParseError::InvalidInt { .. })));

    let envelope: ErrorEnvelope = error
        .ok_or_else(|| std::io::Error::other("expected invalid env error"))?
        .into();
    assert_eq!(envelope.code, ErrorCode::new("config", "invalid_env_int"));
    Ok(())
}

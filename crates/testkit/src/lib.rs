//! # switch-sync-testkit
//!
//! Test doubles for the sync engine: a scriptable remote tree, recording
//! notifier, in-memory logger, and fixture helpers.
//! This crate depends on `ports` and `shared`.

pub mod errors;
pub mod fixtures;
pub mod in_memory;
pub mod remote;

/// Returns the testkit crate version.
#[must_use]
pub const fn testkit_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use switch_sync_ports::ports_crate_version;
    use switch_sync_shared::shared_crate_version;

    #[test]
    fn testkit_can_use_ports_and_shared() {
        assert!(!testkit_crate_version().is_empty());
        assert!(!ports_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }

    #[test]
    fn error_fixtures_are_available() {
        let codes = errors::common_error_codes();
        assert!(!codes.is_empty());
    }

    #[test]
    fn fixture_directory_exists() {
        assert!(fixtures::fixture_path("config/switch-sync.valid.json").is_file());
    }
}

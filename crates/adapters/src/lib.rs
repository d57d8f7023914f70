//! # switch-sync-adapters
//!
//! Adapter implementations for ports: the FTP session, the local mirror store,
//! structured loggers, and the log-backed notifier.
//! This crate depends on `ports`, `shared`, and `domain`.

pub mod ftp;
pub mod local_store;
pub mod log_sink;
pub mod logger;
pub mod notifier;
pub mod tracing_logger;

pub use ftp::{FtpConnector, FtpSession, FtpSettings};
pub use local_store::{LocalMirrorStore, SCRATCH_DIR_NAME, ScratchDir};
pub use log_sink::{BufferLogSink, LogSink, StderrLogSink};
pub use logger::JsonLogger;
pub use notifier::{LogNotifier, NOTIFICATION_EVENT};
pub use tracing_logger::TracingLogger;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use switch_sync_domain::domain_crate_version;
    use switch_sync_ports::ports_crate_version;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;
        let mut in_dev_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]";
                in_dev_deps = line == "[dev-dependencies]";
                continue;
            }
            if !(in_deps || in_dev_deps) {
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
    fn adapters_do_not_depend_on_app_or_infra() {
        let deps = workspace_deps();
        let forbidden = ["switch-sync-app", "switch-sync-infra", "switch-sync-config"];

        for dep in &deps {
            assert!(
                !forbidden.contains(&dep.as_str()),
                "forbidden dependency found: {dep}"
            );
        }
    }

    #[test]
    fn adapters_can_use_ports_and_domain() {
        assert!(!adapters_crate_version().is_empty());
        assert!(!ports_crate_version().is_empty());
        assert!(!domain_crate_version().is_empty());
    }
}

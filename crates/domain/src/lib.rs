//! # switch-sync-domain
//!
//! Domain values for the incremental FTP mirror.
//!
//! This crate contains the domain model with no infrastructure dependencies:
//!
//! - **Timestamps** - `FileTimestamp` and the protocol/file-name codec
//! - **Primitives** - `TargetId`, `RemotePath`
//! - **Targets** - `SyncTarget`, `RenameRule`, `RemoteEntry`
//! - **States** - `SyncOutcome`, `TargetState`, `PassReport`
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No infrastructure or adapter dependencies
//! - Pure domain logic with no I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

// Re-export shared types for convenience
pub use switch_sync_shared::shared_crate_version;

pub mod primitives;
pub mod states;
pub mod target;
pub mod timestamp;

pub use primitives::{PrimitiveError, RemotePath, TargetId, contained_local_path};
pub use states::{ChangeKind, PassReport, SyncOutcome, TargetState};
pub use target::{
    EMUMMC_ALBUM_ROOT, PRIMARY_ALBUM_ROOT, RemoteEntry, RenameRule, SyncTarget, TargetKind,
};
pub use timestamp::{
    DEFAULT_SCREENSHOT_PATTERN, FileTimestamp, TimestampParseError, base_name, format_timestamp,
    parse_embedded_timestamp, parse_protocol_timestamp, split_extension,
    validate_timestamp_pattern,
};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

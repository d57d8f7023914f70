//! # switch-sync-ports
//!
//! Port traits for the switch-sync hexagonal architecture.
//!
//! This crate defines the interfaces between the sync engine and its
//! collaborators (remote server, local mirror, notifications, logging). It
//! depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
///
/// Boundary traits are I/O bound, so the allocation per call is irrelevant next
/// to a network round trip.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod logger;
pub mod notifier;
pub mod remote;
pub mod store;

pub use logger::*;
pub use notifier::*;
pub use remote::*;
pub use store::*;

// Re-export selected domain types used in port signatures, so adapter crates
// can implement ports without directly depending on `switch-sync-domain`.
pub use switch_sync_domain::{ChangeKind, FileTimestamp, RemotePath, TargetId, TargetKind};

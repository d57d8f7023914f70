//! # switch-sync-app
//!
//! The sync engine: remote tree walk, change detection, atomic fetch, one
//! pass per target, and the polling scheduler.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod change_detector;
pub mod fetcher;
pub mod scheduler;
pub mod sync_pass;
pub mod walker;

pub use change_detector::decide;
pub use fetcher::{FetchRequest, fetch_file};
pub use scheduler::{Scheduler, TargetPassResult, TargetStatus};
pub use sync_pass::{SyncPassDeps, run_sync_pass};
pub use walker::{RemoteWalk, walk_remote_tree};

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Local mirror storage boundary contract.

use crate::BoxFuture;
use std::fs::File;
use std::path::PathBuf;
use switch_sync_domain::FileTimestamp;
use switch_sync_shared::{RequestContext, Result};

/// A freshly created, uniquely named file in the scratch directory.
#[derive(Debug)]
pub struct StagingFile {
    /// Location inside the scratch directory.
    pub path: PathBuf,
    /// Open write handle.
    pub file: File,
}

/// Boundary contract for the local side of the mirror.
///
/// The local filesystem is the change log: existence plus mtime is the only
/// persisted sync state.
pub trait MirrorStorePort: Send + Sync {
    /// Modification time of `path`, or `None` when no file exists there.
    fn local_mtime(
        &self,
        ctx: &RequestContext,
        path: PathBuf,
    ) -> BoxFuture<'_, Result<Option<FileTimestamp>>>;

    /// Create `dir` and its parents. An existing directory is success.
    fn ensure_dir(&self, ctx: &RequestContext, dir: PathBuf) -> BoxFuture<'_, Result<()>>;

    /// Create a new staging file with a collision-resistant name.
    fn create_staging(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<StagingFile>>;

    /// Stamp `staging` with `mtime` and atomically move it onto `destination`,
    /// replacing any existing file.
    fn publish(
        &self,
        ctx: &RequestContext,
        staging: PathBuf,
        destination: PathBuf,
        mtime: FileTimestamp,
    ) -> BoxFuture<'_, Result<()>>;

    /// Remove a staging file that will not be published. Missing files are ignored.
    fn discard(&self, ctx: &RequestContext, staging: PathBuf) -> BoxFuture<'_, Result<()>>;
}

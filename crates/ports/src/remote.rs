//! Remote protocol boundary contract.
//!
//! A session is stateful: it has a working directory, and directory identity is
//! only discoverable by trying to enter a path. `change_dir` folds that check
//! into a typed outcome so callers never inspect protocol error codes.

use crate::BoxFuture;
use std::fs::File;
use switch_sync_domain::RemotePath;
use switch_sync_shared::{RequestContext, Result};

/// Result of trying to enter a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDirOutcome {
    /// The path is a directory and is now the working directory.
    Entered,
    /// The server refused because the path is not a directory.
    NotADirectory,
}

/// One logged-in protocol session.
///
/// Sessions are not reentrant: every call takes `&mut self` and must complete
/// before the next one starts.
pub trait RemoteSession: Send {
    /// Enter `path`, reporting whether it is a directory.
    ///
    /// Other failures (connection loss, unexpected replies) are errors.
    fn change_dir(
        &mut self,
        ctx: &RequestContext,
        path: RemotePath,
    ) -> BoxFuture<'_, Result<ChangeDirOutcome>>;

    /// List entry names of the current working directory in server order.
    fn list_names(&mut self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Query the raw modify-time reply for `path`.
    fn modify_time(
        &mut self,
        ctx: &RequestContext,
        path: RemotePath,
    ) -> BoxFuture<'_, Result<String>>;

    /// Stream the bytes of `path` into `sink`, returning the byte count.
    ///
    /// The sink is flushed and synced before the future resolves.
    fn retrieve(
        &mut self,
        ctx: &RequestContext,
        path: RemotePath,
        sink: File,
    ) -> BoxFuture<'_, Result<u64>>;

    /// Log out and close the control connection. Safe to call more than once.
    fn close(&mut self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;
}

/// Opens sessions against the configured server.
pub trait RemoteConnectorPort: Send + Sync {
    /// Connect, log in, and switch to passive transfers.
    fn connect(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Box<dyn RemoteSession>>>;

    /// `host:port` for diagnostics.
    fn endpoint(&self) -> &str;
}

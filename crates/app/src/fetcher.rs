//! Download one remote file into place without ever exposing a partial copy.

use std::path::PathBuf;
use std::time::Duration;
use switch_sync_domain::{FileTimestamp, RemotePath};
use switch_sync_ports::{MirrorStorePort, RemoteSession};
use switch_sync_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, ResultExt,
    timeout_with_context,
};

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Source on the server.
    pub remote_path: RemotePath,
    /// Final local destination.
    pub local_path: PathBuf,
    /// Remote modification time, applied to the local copy.
    pub timestamp: FileTimestamp,
}

/// Fetch `request` through a staging file and publish it atomically.
///
/// The staging file is removed on every failure path, so the destination is
/// either untouched or fully replaced. Errors carry `remotePath` and
/// `localPath` metadata.
pub async fn fetch_file(
    ctx: &RequestContext,
    session: &mut dyn RemoteSession,
    store: &dyn MirrorStorePort,
    request: &FetchRequest,
    transfer_timeout: Option<Duration>,
) -> Result<u64> {
    fetch_inner(ctx, session, store, request, transfer_timeout)
        .await
        .with_metadata("remotePath", request.remote_path.as_str())
        .with_metadata("localPath", request.local_path.display().to_string())
}

async fn fetch_inner(
    ctx: &RequestContext,
    session: &mut dyn RemoteSession,
    store: &dyn MirrorStorePort,
    request: &FetchRequest,
    transfer_timeout: Option<Duration>,
) -> Result<u64> {
    if let Some(parent) = request.local_path.parent() {
        store.ensure_dir(ctx, parent.to_path_buf()).await?;
    }

    let staging = store.create_staging(ctx).await?;
    let staging_path = staging.path.clone();

    let retrieve = session.retrieve(ctx, request.remote_path.clone(), staging.file);
    let transferred = match transfer_timeout {
        Some(limit) => timeout_with_context(ctx, limit, "fetch.retrieve", retrieve)
            .await
            .map_err(|error| {
                if error.has_code("core", "timeout") {
                    ErrorEnvelope::expected_with_class(
                        ErrorCode::new("fetch", "transfer_timeout"),
                        format!("transfer exceeded {}ms", limit.as_millis()),
                        ErrorClass::Retriable,
                    )
                } else {
                    error
                }
            }),
        None => retrieve.await,
    };

    let bytes = match transferred {
        Ok(bytes) => bytes,
        Err(error) => {
            discard_quietly(ctx, store, staging_path).await;
            return Err(error);
        },
    };

    if let Err(error) = store
        .publish(
            ctx,
            staging_path.clone(),
            request.local_path.clone(),
            request.timestamp,
        )
        .await
    {
        discard_quietly(ctx, store, staging_path).await;
        return Err(error);
    }

    Ok(bytes)
}

async fn discard_quietly(ctx: &RequestContext, store: &dyn MirrorStorePort, staging: PathBuf) {
    // Discard ignores missing files; any other failure leaves a stray file in
    // the scratch directory, which is purged at next startup.
    let _ = store.discard(ctx, staging).await;
}

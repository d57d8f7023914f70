//! Depth-first discovery of the files under a remote root.
//!
//! The protocol has no "is this a directory" query, so every listed name is
//! tested by trying to enter it. Entering succeeds for directories; a
//! not-a-directory refusal identifies a file.

use serde_json::json;
use std::collections::HashSet;
use switch_sync_domain::{RemoteEntry, RemotePath};
use switch_sync_ports::{ChangeDirOutcome, LogLevel, LoggerPort, RemoteSession, log_fields};
use switch_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};

/// Files discovered under one root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteWalk {
    /// Files in discovery order (depth-first, server listing order).
    pub entries: Vec<RemoteEntry>,
    /// Directories whose listing or directory check failed and were skipped.
    pub skipped_dirs: u64,
}

struct Frame {
    dir: RemotePath,
    names: std::vec::IntoIter<String>,
}

/// Walk `root` and return every file below it.
///
/// Fails only when the root itself cannot be entered or listed. Failures deeper
/// in the tree are logged as `sync.walk.skipped` and the walk continues with the
/// next sibling.
pub async fn walk_remote_tree(
    ctx: &RequestContext,
    session: &mut dyn RemoteSession,
    root: &RemotePath,
    logger: Option<&dyn LoggerPort>,
) -> Result<RemoteWalk> {
    match session.change_dir(ctx, root.clone()).await? {
        ChangeDirOutcome::Entered => {},
        ChangeDirOutcome::NotADirectory => {
            return Err(ErrorEnvelope::expected_with_class(
                ErrorCode::new("remote", "root_not_directory"),
                format!("remote root is not a directory: {root}"),
                ErrorClass::NonRetriable,
            )
            .with_metadata("remotePath", root.as_str()));
        },
    }
    let names = session
        .list_names(ctx)
        .await
        .map_err(|error| error.with_metadata("remotePath", root.as_str()))?;

    let mut walk = RemoteWalk::default();
    let mut visited = HashSet::from([root.clone()]);
    let mut stack = vec![Frame {
        dir: root.clone(),
        names: names.into_iter(),
    }];

    while let Some(frame) = stack.last_mut() {
        let dir = frame.dir.clone();
        let Some(raw) = frame.names.next() else {
            stack.pop();
            if let Some(parent) = stack.last() {
                restore_parent(ctx, session, &parent.dir, logger).await;
            }
            continue;
        };

        // `.`/`..` and blank names are not entries.
        let Ok(path) = dir.join(&raw) else {
            continue;
        };
        if !visited.insert(path.clone()) {
            continue;
        }

        match session.change_dir(ctx, path.clone()).await {
            Ok(ChangeDirOutcome::NotADirectory) => walk.entries.push(RemoteEntry::file(path)),
            Ok(ChangeDirOutcome::Entered) => match session.list_names(ctx).await {
                Ok(names) => stack.push(Frame {
                    dir: path,
                    names: names.into_iter(),
                }),
                Err(error) => {
                    walk.skipped_dirs = walk.skipped_dirs.saturating_add(1);
                    log_skipped(logger, &path, "list", &error);
                    restore_parent(ctx, session, &dir, logger).await;
                },
            },
            Err(error) => {
                walk.skipped_dirs = walk.skipped_dirs.saturating_add(1);
                log_skipped(logger, &path, "change_dir", &error);
            },
        }
    }

    Ok(walk)
}

async fn restore_parent(
    ctx: &RequestContext,
    session: &mut dyn RemoteSession,
    parent: &RemotePath,
    logger: Option<&dyn LoggerPort>,
) {
    // Directory checks use absolute paths, so a failed restore only leaves the session
    // somewhere unexpected; it does not change what gets discovered.
    if let Err(error) = session.change_dir(ctx, parent.clone()).await
        && let Some(logger) = logger
    {
        logger.failure(
            LogLevel::Debug,
            "sync.walk.restore_failed",
            "could not return to parent directory",
            Some(log_fields([("remotePath", json!(parent.as_str()))])),
            &error,
        );
    }
}

fn log_skipped(
    logger: Option<&dyn LoggerPort>,
    path: &RemotePath,
    step: &str,
    error: &ErrorEnvelope,
) {
    if let Some(logger) = logger {
        logger.failure(
            LogLevel::Warn,
            "sync.walk.skipped",
            "skipping remote subtree",
            Some(log_fields([
                ("remotePath", json!(path.as_str())),
                ("step", json!(step)),
            ])),
            error,
        );
    }
}

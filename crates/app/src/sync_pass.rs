//! One sync pass for one target: connect, walk every root, fetch what changed.

use crate::change_detector::decide;
use crate::fetcher::{FetchRequest, fetch_file};
use crate::walker::walk_remote_tree;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use switch_sync_domain::{
    FileTimestamp, PassReport, RemoteEntry, RemotePath, SyncOutcome, SyncTarget, TargetKind,
    parse_protocol_timestamp,
};
use switch_sync_ports::{
    LogLevel, LoggerPort, MirrorStorePort, Notification, NotifierPort, RemoteConnectorPort,
    RemoteSession, log_fields,
};
use switch_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use tokio::time::Instant;

/// Collaborators shared by every pass.
#[derive(Clone)]
pub struct SyncPassDeps {
    /// Opens one session per pass.
    pub connector: Arc<dyn RemoteConnectorPort>,
    /// Local mirror and scratch storage.
    pub store: Arc<dyn MirrorStorePort>,
    /// Receives one notification per fetched file.
    pub notifier: Arc<dyn NotifierPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Optional bound on a single file transfer.
    pub transfer_timeout: Option<Duration>,
}

/// Run one pass for `target`.
///
/// Only a failure to open the session fails the pass. Everything below that
/// (unlistable roots, timestamp errors, failed fetches) is logged, counted in
/// the report, and retried naturally on the next pass.
pub async fn run_sync_pass(
    ctx: &RequestContext,
    deps: &SyncPassDeps,
    target: &SyncTarget,
) -> Result<PassReport> {
    let started = Instant::now();
    let logger = deps.logger.as_ref().map(|logger| {
        logger.child(log_fields([
            ("target", json!(target.id.as_str())),
            ("correlationId", json!(ctx.correlation_id().as_str())),
        ]))
    });
    let logger = logger.as_deref();

    if let Some(logger) = logger {
        logger.info(
            "sync.pass.started",
            "sync pass started",
            Some(log_fields([("endpoint", json!(deps.connector.endpoint()))])),
        );
    }

    let session = match deps.connector.connect(ctx).await {
        Ok(session) => session,
        Err(error) => {
            if let Some(logger) = logger {
                logger.failure(
                    LogLevel::Error,
                    "sync.pass.connect_failed",
                    "could not open remote session",
                    None,
                    &error,
                );
            }
            return Err(error.with_metadata("target", target.id.as_str()));
        },
    };

    let mut pass = PassSession::new(deps.connector.as_ref(), session, logger);
    let mut report = PassReport::for_target(target.id.clone());
    for root in &target.remote_roots {
        sync_root(ctx, deps, target, &mut pass, root, &mut report, logger).await;
    }
    pass.close(ctx).await;

    report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if let Some(logger) = logger {
        logger.info(
            "sync.pass.completed",
            "sync pass completed",
            Some(report_fields(&report)),
        );
    }
    Ok(report)
}

async fn sync_root(
    ctx: &RequestContext,
    deps: &SyncPassDeps,
    target: &SyncTarget,
    pass: &mut PassSession<'_>,
    root: &RemotePath,
    report: &mut PassReport,
    logger: Option<&dyn LoggerPort>,
) {
    let walked = match pass.session(ctx).await {
        Ok(session) => walk_remote_tree(ctx, session, root, logger).await,
        Err(error) => Err(error),
    };
    let walk = match walked {
        Ok(walk) => walk,
        Err(error) => {
            report.skipped_dirs = report.skipped_dirs.saturating_add(1);
            if let Some(logger) = logger {
                logger.failure(
                    LogLevel::Warn,
                    "sync.root.skipped",
                    "remote root unavailable",
                    Some(log_fields([("remotePath", json!(root.as_str()))])),
                    &error,
                );
            }
            return;
        },
    };

    report.skipped_dirs = report.skipped_dirs.saturating_add(walk.skipped_dirs);
    report.discovered = report
        .discovered
        .saturating_add(u64::try_from(walk.entries.len()).unwrap_or(u64::MAX));

    for entry in &walk.entries {
        let outcome = sync_entry(ctx, deps, target, pass, root, entry, report, logger).await;
        report.record(&outcome);
    }
}

#[expect(
    clippy::too_many_arguments,
    reason = "pass-internal helper threading borrowed pass state"
)]
async fn sync_entry(
    ctx: &RequestContext,
    deps: &SyncPassDeps,
    target: &SyncTarget,
    pass: &mut PassSession<'_>,
    root: &RemotePath,
    entry: &RemoteEntry,
    report: &mut PassReport,
    logger: Option<&dyn LoggerPort>,
) -> SyncOutcome {
    let local_path = target.local_path_for(root, entry);
    let file_fields = || {
        log_fields([
            ("remotePath", json!(entry.full_path.as_str())),
            ("localPath", json!(local_path.display().to_string())),
        ])
    };
    let log_failure = |message: &str, error: &ErrorEnvelope| {
        if let Some(logger) = logger {
            logger.failure(
                LogLevel::Warn,
                "sync.file.failed",
                message,
                Some(file_fields()),
                error,
            );
        }
    };

    let remote_time = match remote_timestamp(ctx, pass, &entry.full_path).await {
        Ok(timestamp) => Some(timestamp),
        Err(error) => {
            log_failure("remote modification time unavailable", &error);
            None
        },
    };
    let local_time = match deps.store.local_mtime(ctx, local_path.clone()).await {
        Ok(local_time) => local_time,
        Err(error) => {
            log_failure("local file unreadable", &error);
            return SyncOutcome::failed(error.message);
        },
    };

    let outcome = decide(remote_time, local_time);
    let (Some(change), Some(timestamp)) = (outcome.change(), remote_time) else {
        return outcome;
    };

    let request = FetchRequest {
        remote_path: entry.full_path.clone(),
        local_path: local_path.clone(),
        timestamp,
    };
    let fetched = match pass.session(ctx).await {
        Ok(session) => {
            fetch_file(ctx, session, deps.store.as_ref(), &request, deps.transfer_timeout).await
        },
        Err(error) => Err(error),
    };
    if let Err(error) = &fetched {
        pass.observe_failure(ctx, error).await;
    }
    match fetched {
        Ok(bytes) => {
            report.bytes = report.bytes.saturating_add(bytes);
            if let Some(logger) = logger {
                let mut fields = file_fields();
                fields.insert("bytes".into(), json!(bytes));
                fields.insert("change".into(), json!(change));
                logger.info("sync.file.fetched", "file fetched", Some(fields));
            }
            let notification = Notification {
                target: target.id.clone(),
                target_kind: target.kind,
                display_name: display_name(target.kind, entry, &local_path).into(),
                local_path: local_path.clone(),
                kind: change,
            };
            if let Err(error) = deps.notifier.notify(ctx, notification).await
                && let Some(logger) = logger
            {
                logger.failure(
                    LogLevel::Warn,
                    "sync.notify.failed",
                    "notification delivery failed",
                    Some(file_fields()),
                    &error,
                );
            }
            outcome
        },
        Err(error) => {
            log_failure("fetch failed", &error);
            SyncOutcome::failed(error.message)
        },
    }
}

async fn remote_timestamp(
    ctx: &RequestContext,
    pass: &mut PassSession<'_>,
    path: &RemotePath,
) -> Result<FileTimestamp> {
    let queried = pass.session(ctx).await?.modify_time(ctx, path.clone()).await;
    if let Err(error) = &queried {
        pass.observe_failure(ctx, error).await;
    }
    let raw = queried?;
    parse_protocol_timestamp(&raw)
        .map_err(|error| ErrorEnvelope::from(error).with_metadata("remotePath", path.as_str()))
}

/// The pass's control connection.
///
/// An abandoned transfer (for instance one cut off by the transfer timeout)
/// leaves the connection unusable. The next operation then opens a fresh
/// session once; if that fails too, the rest of the pass reports the connect
/// error without retrying.
struct PassSession<'a> {
    connector: &'a dyn RemoteConnectorPort,
    current: Option<Box<dyn RemoteSession>>,
    lost: Option<ErrorEnvelope>,
    logger: Option<&'a dyn LoggerPort>,
}

impl<'a> PassSession<'a> {
    fn new(
        connector: &'a dyn RemoteConnectorPort,
        session: Box<dyn RemoteSession>,
        logger: Option<&'a dyn LoggerPort>,
    ) -> Self {
        Self {
            connector,
            current: Some(session),
            lost: None,
            logger,
        }
    }

    async fn session(
        &mut self,
        ctx: &RequestContext,
    ) -> Result<&mut (dyn RemoteSession + 'static)> {
        if self.current.is_none() {
            if let Some(error) = &self.lost {
                return Err(error.clone());
            }
            match self.connector.connect(ctx).await {
                Ok(session) => {
                    if let Some(logger) = self.logger {
                        logger.info("sync.pass.reconnected", "remote session reopened", None);
                    }
                    self.current = Some(session);
                },
                Err(error) => {
                    if let Some(logger) = self.logger {
                        logger.failure(
                            LogLevel::Error,
                            "sync.pass.reconnect_failed",
                            "could not reopen remote session",
                            None,
                            &error,
                        );
                    }
                    self.lost = Some(error.clone());
                    return Err(error);
                },
            }
        }
        match self.current.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(ErrorEnvelope::invariant(
                ErrorCode::internal(),
                "remote session missing after connect",
            )),
        }
    }

    /// Drop the connection when `error` means it can no longer be used.
    async fn observe_failure(&mut self, ctx: &RequestContext, error: &ErrorEnvelope) {
        if !is_session_lost(error) {
            return;
        }
        if let Some(mut session) = self.current.take() {
            let _ = session.close(ctx).await;
            if let Some(logger) = self.logger {
                logger.failure(
                    LogLevel::Warn,
                    "sync.pass.session_lost",
                    "remote session unusable, reopening",
                    None,
                    error,
                );
            }
        }
    }

    async fn close(&mut self, ctx: &RequestContext) {
        let Some(mut session) = self.current.take() else {
            return;
        };
        if let Err(error) = session.close(ctx).await
            && let Some(logger) = self.logger
        {
            logger.failure(
                LogLevel::Debug,
                "sync.pass.close_failed",
                "closing remote session failed",
                None,
                &error,
            );
        }
    }
}

fn is_session_lost(error: &ErrorEnvelope) -> bool {
    error.has_code("remote", "session_closed") || error.has_code("fetch", "transfer_timeout")
}

/// Album captures are announced under their renamed local name; mirrored
/// files keep the remote base name.
fn display_name(kind: TargetKind, entry: &RemoteEntry, local_path: &Path) -> String {
    match kind {
        TargetKind::Screenshots => local_path
            .file_name()
            .map_or_else(|| entry.file_name().to_owned(), |name| name.to_string_lossy().into_owned()),
        TargetKind::FileSync => entry.file_name().to_owned(),
    }
}

fn report_fields(report: &PassReport) -> switch_sync_ports::LogFields {
    log_fields([
        ("discovered", json!(report.discovered)),
        ("unchanged", json!(report.unchanged)),
        ("new", json!(report.new)),
        ("updated", json!(report.updated)),
        ("failed", json!(report.failed)),
        ("skippedDirs", json!(report.skipped_dirs)),
        ("bytes", json!(report.bytes)),
        ("elapsedMs", json!(report.elapsed_ms)),
    ])
}

//! Notification adapter that reports fetches through the structured logger.

use serde_json::json;
use std::sync::Arc;
use switch_sync_ports::{
    BoxFuture, ChangeKind, LoggerPort, Notification, NotifierPort, log_fields,
};
use switch_sync_shared::{RequestContext, Result};

/// Event name carried by every notification line.
pub const NOTIFICATION_EVENT: &str = "sync.notification";

/// Emits each notification as an info-level log event.
#[derive(Clone)]
pub struct LogNotifier {
    logger: Arc<dyn LoggerPort>,
}

impl LogNotifier {
    /// Wrap a logger.
    #[must_use]
    pub fn new(logger: Arc<dyn LoggerPort>) -> Self {
        Self { logger }
    }
}

impl NotifierPort for LogNotifier {
    fn notify(
        &self,
        ctx: &RequestContext,
        notification: Notification,
    ) -> BoxFuture<'_, Result<()>> {
        let correlation_id = ctx.correlation_id().as_str().to_owned();
        Box::pin(async move {
            let kind = match notification.kind {
                ChangeKind::New => "new",
                ChangeKind::Updated => "updated",
            };
            self.logger.info(
                NOTIFICATION_EVENT,
                &notification.message(),
                Some(log_fields([
                    ("target", json!(notification.target.as_str())),
                    ("displayName", json!(notification.display_name.as_ref())),
                    ("localPath", json!(notification.local_path.display().to_string())),
                    ("kind", json!(kind)),
                    ("correlationId", json!(correlation_id)),
                ])),
            );
            Ok(())
        })
    }
}

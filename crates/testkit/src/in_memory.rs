//! In-memory logger and notifier doubles.

use std::sync::{Arc, Mutex};
use switch_sync_ports::{
    BoxFuture, LogEvent, LogFields, LoggerPort, Notification, NotifierPort,
};
use switch_sync_shared::{RequestContext, Result};

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// Logger that keeps every event (with child base fields merged in).
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
    base_fields: LogFields,
}

impl MemoryLogger {
    /// Fresh logger with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of captured events.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured event names in emission order.
    pub fn event_names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.event.into_string())
            .collect()
    }

    /// Number of events named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.event.as_ref() == name)
            .count()
    }
}

impl LoggerPort for MemoryLogger {
    fn log(&self, mut event: LogEvent) {
        if !self.base_fields.is_empty() {
            let mut fields = self.base_fields.clone();
            fields.extend(event.fields.take().unwrap_or_default());
            event.fields = Some(fields);
        }
        self.events.lock().unwrap().push(event);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            events: Arc::clone(&self.events),
            base_fields: merged,
        })
    }
}

/// Notifier that records every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<Notification>>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Recording notifier that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recording notifier whose deliveries fail after being recorded.
    pub fn failing() -> Self {
        Self {
            received: Arc::default(),
            fail: true,
        }
    }

    /// Snapshot of received notifications.
    pub fn notifications(&self) -> Vec<Notification> {
        self.received.lock().unwrap().clone()
    }

    /// Display names in delivery order.
    pub fn display_names(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .map(|notification| notification.display_name.into_string())
            .collect()
    }
}

impl NotifierPort for RecordingNotifier {
    fn notify(
        &self,
        _ctx: &RequestContext,
        notification: Notification,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.received.lock().unwrap().push(notification);
            if self.fail {
                return Err(switch_sync_shared::ErrorEnvelope::expected(
                    switch_sync_shared::ErrorCode::new("notify", "unavailable"),
                    "notification channel unavailable",
                ));
            }
            Ok(())
        })
    }
}

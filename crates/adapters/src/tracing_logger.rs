//! `LoggerPort` adapter that forwards events into `tracing`.
//!
//! Used when the CLI installs a `tracing-subscriber` pipeline (pretty output or
//! `RUST_LOG` filtering). Structured fields travel as one JSON-encoded value.

use serde_json::Value;
use switch_sync_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use switch_sync_shared::{REDACTED, is_secret_key};

/// Forwards structured events to the global `tracing` dispatcher.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    base_fields: LogFields,
}

impl TracingLogger {
    /// Logger with no base fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let mut fields = self.base_fields.clone();
        fields.extend(event.fields.unwrap_or_default());
        let fields = render_fields(&fields);
        let error = event.error.map(|error| error.to_string()).unwrap_or_default();
        let name = event.event.as_ref();
        let message = event.message.as_ref();

        match event.level {
            LogLevel::Debug => tracing::debug!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Info => tracing::info!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Warn => tracing::warn!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Error => tracing::error!(event = name, fields = %fields, error = %error, "{message}"),
        }
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            base_fields: merged,
        })
    }
}

fn render_fields(fields: &LogFields) -> String {
    let object: serde_json::Map<String, Value> = fields
        .iter()
        .map(|(key, value)| {
            let value = if is_secret_key(key) {
                Value::from(REDACTED)
            } else {
                value.clone()
            };
            (key.to_string(), value)
        })
        .collect();
    Value::Object(object).to_string()
}

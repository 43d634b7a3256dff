//! Logger adapter forwarding structured events into `tracing`.
//!
//! Used by the CLI, where a `tracing-subscriber` owns formatting and filtering.

use crate::logger::{redact_fields, redact_value};
use callmeter_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use serde_json::Value;

/// `LoggerPort` that re-emits every event through the `tracing` macros.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    base_fields: LogFields,
}

impl TracingLogger {
    /// Create a logger with no base fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let mut fields = self.base_fields.clone();
        if let Some(extra) = event.fields {
            fields.extend(extra);
        }
        redact_fields(&mut fields);
        let fields = render(&fields);

        let error = event.error.map(|mut value| {
            redact_value(&mut value);
            value.to_string()
        });
        let error = error.as_deref().unwrap_or("");
        let name = event.event.as_ref();
        let message = event.message.as_ref();

        match event.level {
            LogLevel::Debug => {
                tracing::debug!(event = name, fields = %fields, error, "{message}");
            },
            LogLevel::Info => {
                tracing::info!(event = name, fields = %fields, error, "{message}");
            },
            LogLevel::Warn => {
                tracing::warn!(event = name, fields = %fields, error, "{message}");
            },
            LogLevel::Error => {
                tracing::error!(event = name, fields = %fields, error, "{message}");
            },
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

fn render(fields: &LogFields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_keeps_field_order_and_values() {
        let mut fields = LogFields::new();
        fields.insert("b".into(), Value::from(2));
        fields.insert("a".into(), Value::from("x"));
        assert_eq!(render(&fields).to_string(), r#"{"a":"x","b":2}"#);
    }

    #[test]
    fn logging_without_subscriber_is_a_no_op() {
        let logger = TracingLogger::new();
        let child = logger.child(LogFields::new());
        child.warn("timer.mismatch", "no subscriber installed", None);
        logger.error("sink.emit_failed", "still fine", None);
    }
}

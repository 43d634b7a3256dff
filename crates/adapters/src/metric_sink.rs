//! JSON-lines metric sink adapters.

use crate::log_sink::LogSink;
use callmeter_ports::{MetricKey, MetricKind, MetricSinkPort, SinkError, check_arity};
use callmeter_shared::redaction::{REDACTED, is_secret_key};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Static tags attached to every emitted metric line.
pub type MetricTags = BTreeMap<Box<str>, Box<str>>;

/// Metric sink that writes one JSON line per emission.
///
/// Line shape:
/// `{"type":"metric","timestampMs":..,"kind":"elapsedCpu","name":"..","values":[..],"tags":{..}}`.
/// Flushes are forwarded to the underlying `LogSink`.
#[derive(Clone)]
pub struct JsonMetricSink {
    sink: Arc<dyn LogSink>,
    tags: MetricTags,
}

impl JsonMetricSink {
    /// Create a metric sink writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            tags: MetricTags::new(),
        }
    }

    /// Set tags applied to every line. Secret-looking tag keys are redacted.
    #[must_use]
    pub fn with_tags(mut self, tags: MetricTags) -> Self {
        self.tags = tags;
        self
    }

    fn render(&self, key: &MetricKey, kind: MetricKind, values: &[i64]) -> String {
        let mut payload = serde_json::Map::new();
        payload.insert("type".to_string(), Value::String("metric".to_string()));
        payload.insert(
            "timestampMs".to_string(),
            Value::from(crate::clock::epoch_millis()),
        );
        payload.insert("kind".to_string(), Value::String(kind.as_str().to_string()));
        payload.insert("name".to_string(), Value::String(key.as_str().to_string()));
        payload.insert(
            "values".to_string(),
            Value::Array(values.iter().copied().map(Value::from).collect()),
        );
        if !self.tags.is_empty() {
            payload.insert("tags".to_string(), tags_to_json(&self.tags));
        }

        let mut line = Value::Object(payload).to_string();
        line.push('\n');
        line
    }
}

impl MetricSinkPort for JsonMetricSink {
    fn emit(&self, key: &MetricKey, kind: MetricKind, values: &[i64]) -> Result<(), SinkError> {
        check_arity(key, kind, values)?;
        let line = self.render(key, kind, values);
        self.sink
            .write_line(&line)
            .map_err(|error| SinkError::Unavailable {
                reason: error.to_string().into_boxed_str(),
            })
    }

    fn flush(&self, _key: &MetricKey) -> Result<(), SinkError> {
        self.sink.flush().map_err(|error| SinkError::Unavailable {
            reason: error.to_string().into_boxed_str(),
        })
    }
}

/// Sink that accepts and drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricSink;

impl MetricSinkPort for NoopMetricSink {
    fn emit(&self, key: &MetricKey, kind: MetricKind, values: &[i64]) -> Result<(), SinkError> {
        check_arity(key, kind, values)
    }
}

/// Sink that forwards each emission to every inner sink.
///
/// All inner sinks are tried; the first failure is returned.
#[derive(Clone, Default)]
pub struct FanoutMetricSink {
    sinks: Vec<Arc<dyn MetricSinkPort>>,
}

impl FanoutMetricSink {
    /// Build a fan-out over `sinks`.
    #[must_use]
    pub const fn new(sinks: Vec<Arc<dyn MetricSinkPort>>) -> Self {
        Self { sinks }
    }

    /// Number of inner sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no inner sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricSinkPort for FanoutMetricSink {
    fn emit(&self, key: &MetricKey, kind: MetricKind, values: &[i64]) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(error) = sink.emit(key, kind, values) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush(&self, key: &MetricKey) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(error) = sink.flush(key) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn tags_to_json(tags: &MetricTags) -> Value {
    let mut map = serde_json::Map::new();
    for (key, value) in tags {
        let value = if is_secret_key(key) {
            REDACTED.to_string()
        } else {
            value.to_string()
        };
        map.insert(key.to_string(), Value::String(value));
    }
    Value::Object(map)
}

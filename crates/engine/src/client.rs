//! Timer clients and their registry.
//!
//! A [`TimerClient`] pairs a nested timer with one metric sink. Every
//! recorded value goes to the client's [`MetricRegistry`] and to the sink;
//! sink failures and timer mismatches are logged and swallowed so the caller's
//! code path is never affected.

use crate::context;
use crate::registry::MetricRegistry;
use crate::timer::NestedCallTimer;
use callmeter_config::{DEFAULT_SINK_NAME, ValidatedConfig};
use callmeter_domain::{CPU_SUFFIX, MetricKey, MetricKind, TimerMismatch, TimerReading};
use callmeter_ports::{
    Clock, CpuClock, LogFields, LogLevel, LoggerPort, MetricSinkPort, SinkError,
};
use callmeter_shared::{ErrorEnvelope, ResultExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Capabilities shared by every engine component.
#[derive(Clone)]
pub struct EngineDeps {
    /// Wall and monotonic clock.
    pub clock: Arc<dyn Clock>,
    /// Per-thread CPU clock.
    pub cpu_clock: Arc<dyn CpuClock>,
    /// Structured logger for swallowed failures.
    pub logger: Arc<dyn LoggerPort>,
}

/// Named timer bound to one metric sink.
pub struct TimerClient {
    name: Box<str>,
    timer: NestedCallTimer,
    sink: Arc<dyn MetricSinkPort>,
    registry: Arc<MetricRegistry>,
    logger: Arc<dyn LoggerPort>,
}

impl TimerClient {
    /// Build a client whose windowed stats expire after `window_ms`.
    #[must_use]
    pub fn new(
        name: impl Into<Box<str>>,
        deps: &EngineDeps,
        sink: Arc<dyn MetricSinkPort>,
        window_ms: u64,
    ) -> Self {
        let name = name.into();
        let mut fields = LogFields::new();
        fields.insert("client".into(), Value::String(name.to_string()));
        Self {
            timer: NestedCallTimer::new(Arc::clone(&deps.clock), Arc::clone(&deps.cpu_clock)),
            registry: Arc::new(MetricRegistry::new(Arc::clone(&deps.clock), window_ms)),
            logger: Arc::from(deps.logger.child(fields)),
            sink,
            name,
        }
    }

    /// Client name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Windowed stats recorded by this client.
    #[must_use]
    pub const fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Timer driving `start_metric`/`end_metric`.
    #[must_use]
    pub const fn timer(&self) -> &NestedCallTimer {
        &self.timer
    }

    /// Open a timing frame for `key` in the calling context.
    pub fn start_metric(&self, key: &MetricKey) {
        self.timer.start(key.as_str());
    }

    /// Close the frame opened for `key` and record it under `key`.
    ///
    /// Returns `None` when the innermost frame was not `key`; the frame is
    /// still discarded.
    pub fn end_metric(&self, key: &MetricKey) -> Option<TimerReading> {
        self.end_metric_as(key, key)
    }

    /// Close the frame opened for `key` and record it under `record_as`.
    pub fn end_metric_as(&self, key: &MetricKey, record_as: &MetricKey) -> Option<TimerReading> {
        let reading = self
            .timer
            .end(key.as_str())
            .swallow_with(|mismatch| self.report_mismatch(mismatch))?;
        self.record_reading(record_as, &reading);
        Some(reading)
    }

    /// Drop the innermost frame without recording it.
    pub fn cancel_metric(&self) -> bool {
        self.timer.cancel()
    }

    /// Record a wall-clock interval measured elsewhere. No CPU stat is kept.
    pub fn register_metric(&self, key: &MetricKey, start_ms: i64, end_ms: i64) {
        let elapsed = end_ms.saturating_sub(start_ms).max(0);
        self.register_elapsed_metric(key, elapsed, None);
    }

    /// Record an elapsed time and optional CPU time measured elsewhere.
    pub fn register_elapsed_metric(&self, key: &MetricKey, elapsed_ms: i64, cpu_nanos: Option<i64>) {
        self.registry.average(key).update_value(elapsed_ms);
        if let Some(cpu) = cpu_nanos {
            self.registry.average(&key.child(CPU_SUFFIX)).update_value(cpu);
        }
        self.emit(key, MetricKind::ElapsedCpu, &[elapsed_ms, cpu_nanos.unwrap_or(0)]);
    }

    /// Record a matched timer reading under `key`.
    pub fn record_reading(&self, key: &MetricKey, reading: &TimerReading) {
        self.register_elapsed_metric(key, reading.elapsed_millis(), Some(reading.cpu_nanos()));
    }

    /// Add `delta` to the counter `key`.
    pub fn record_count(&self, key: &MetricKey, delta: i64) {
        self.registry.counter(key).update_value(delta);
        self.emit(key, MetricKind::CounterDelta, &[delta]);
    }

    /// Replace the counter `key` with `value`.
    pub fn set_count(&self, key: &MetricKey, value: i64) {
        self.registry.counter(key).set_value(value);
        self.emit(key, MetricKind::Counter, &[value]);
    }

    /// Record the point-in-time level `value` under `key`.
    pub fn record_gauge(&self, key: &MetricKey, value: i64) {
        self.registry.point(key).update_value(value);
        self.emit(key, MetricKind::Gauge, &[value]);
    }

    /// Merge `value` into the averaged stat `key` and publish it as a gauge.
    pub fn record_sample(&self, key: &MetricKey, value: i64) {
        self.registry.average(key).update_value(value);
        self.emit(key, MetricKind::Gauge, &[value]);
    }

    /// Ask the sink to push buffered updates for `key`.
    pub fn flush(&self, key: &MetricKey) {
        self.sink
            .flush(key)
            .swallow_with(|error| self.report_sink_error("sink.flush_failed", key, error));
    }

    /// Run `future` with its own timer stacks, independent of the thread it
    /// is polled on.
    pub async fn scope<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        context::scope(future).await
    }

    /// Logger carrying this client's base fields.
    pub(crate) fn logger(&self) -> &dyn LoggerPort {
        self.logger.as_ref()
    }

    fn emit(&self, key: &MetricKey, kind: MetricKind, values: &[i64]) {
        self.sink
            .emit(key, kind, values)
            .swallow_with(|error| self.report_sink_error("sink.emit_failed", key, error));
    }

    fn report_sink_error(&self, event: &str, key: &MetricKey, error: SinkError) {
        let envelope = ErrorEnvelope::from(error);
        self.logger
            .failure(LogLevel::Warn, event, &envelope, Some(key_fields(key)));
    }

    fn report_mismatch(&self, mismatch: TimerMismatch) {
        let envelope = ErrorEnvelope::from(mismatch);
        self.logger
            .failure(LogLevel::Warn, "timer.mismatch", &envelope, None);
    }
}

impl std::fmt::Debug for TimerClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TimerClient")
            .field("name", &self.name)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

pub(crate) fn key_fields(key: &MetricKey) -> LogFields {
    let mut fields = LogFields::new();
    fields.insert("metricKey".into(), Value::String(key.to_string()));
    fields
}

/// Timer clients by name, built once at startup.
#[derive(Debug, Clone)]
pub struct TimerClientRegistry {
    clients: BTreeMap<Box<str>, Arc<TimerClient>>,
    default_client: Arc<TimerClient>,
}

impl TimerClientRegistry {
    /// Build one client per configured sink name.
    ///
    /// `sink_for` supplies the metric sink of each named client. The first
    /// configured name becomes the default client.
    pub fn from_config(
        config: &ValidatedConfig,
        deps: &EngineDeps,
        sink_for: impl Fn(&str) -> Arc<dyn MetricSinkPort>,
    ) -> Self {
        let window_ms = config.metrics.window_ms;
        let build = |name: &str| Arc::new(TimerClient::new(name, deps, sink_for(name), window_ms));

        let mut clients = BTreeMap::new();
        let mut default_client = None;
        for name in &config.sinks {
            let client = build(name);
            default_client.get_or_insert_with(|| Arc::clone(&client));
            clients.insert(name.as_str().into(), client);
        }
        let default_client = default_client.unwrap_or_else(|| {
            let client = build(DEFAULT_SINK_NAME);
            clients.insert(DEFAULT_SINK_NAME.into(), Arc::clone(&client));
            client
        });

        Self {
            clients,
            default_client,
        }
    }

    /// Client registered as `name`.
    pub fn get(&self, name: &str) -> Option<Arc<TimerClient>> {
        self.clients.get(name).cloned()
    }

    /// Client of the first configured sink.
    #[must_use]
    pub fn default_client(&self) -> Arc<TimerClient> {
        Arc::clone(&self.default_client)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(AsRef::as_ref)
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

//! In-memory doubles for port contracts.
//!
//! These implementations are intended for:
//! - Unit/integration tests of the engine and adapters
//! - Deterministic time and CPU readings
//! - Capturing emissions and log events for assertions

use callmeter_domain::UserId;
use callmeter_ports::{
    Clock, CpuClock, IdentityError, IdentityPort, LogEvent, LogFields, LoggerPort, MetricKey,
    MetricKind, MetricSinkPort, SinkError, check_arity,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

const NANOS_PER_MILLI: i64 = 1_000_000;

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// Clock that only moves when told to.
///
/// `advance` moves both the wall and the precise reading; `advance_nanos`
/// moves only the precise reading.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
    nanos: AtomicI64,
}

impl ManualClock {
    /// Start at `millis` since the epoch.
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
            nanos: AtomicI64::new(millis.saturating_mul(NANOS_PER_MILLI)),
        }
    }

    /// Move forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
        self.nanos
            .fetch_add(millis.saturating_mul(NANOS_PER_MILLI), Ordering::SeqCst);
    }

    /// Move only the precise reading forward by `nanos`.
    pub fn advance_nanos(&self, nanos: i64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Jump the wall reading to `millis`.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn precise_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

/// CPU clock shared by every thread, moved by hand.
#[derive(Debug, Default)]
pub struct FixedCpuClock {
    nanos: AtomicI64,
}

impl FixedCpuClock {
    /// Start at `nanos`.
    pub fn new(nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(nanos),
        }
    }

    /// Add `nanos` of CPU time.
    pub fn advance(&self, nanos: i64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl CpuClock for FixedCpuClock {
    fn current_thread_cpu_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

/// One recorded sink emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    /// Metric key.
    pub key: String,
    /// Declared kind.
    pub kind: MetricKind,
    /// Emitted values.
    pub values: Vec<i64>,
}

#[derive(Debug, Default)]
struct SinkLog {
    emissions: Vec<Emission>,
    flushed: Vec<String>,
}

/// Sink that records every emission and flush in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    log: Mutex<SinkLog>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every emission so far.
    pub fn emissions(&self) -> Vec<Emission> {
        self.log.lock().unwrap().emissions.clone()
    }

    /// `(kind, values)` of each emission for `key`, in order.
    pub fn emissions_for(&self, key: &MetricKey) -> Vec<(MetricKind, Vec<i64>)> {
        self.log
            .lock()
            .unwrap()
            .emissions
            .iter()
            .filter(|emission| emission.key == key.as_str())
            .map(|emission| (emission.kind, emission.values.clone()))
            .collect()
    }

    /// Keys of each emission, in order.
    pub fn emitted_names(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .emissions
            .iter()
            .map(|emission| emission.key.clone())
            .collect()
    }

    /// Keys flushed so far, in order.
    pub fn flushed(&self) -> Vec<String> {
        self.log.lock().unwrap().flushed.clone()
    }

    /// Whether nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.log.lock().unwrap().emissions.is_empty()
    }
}

impl MetricSinkPort for RecordingSink {
    fn emit(&self, key: &MetricKey, kind: MetricKind, values: &[i64]) -> Result<(), SinkError> {
        check_arity(key, kind, values)?;
        self.log.lock().unwrap().emissions.push(Emission {
            key: key.as_str().to_string(),
            kind,
            values: values.to_vec(),
        });
        Ok(())
    }

    fn flush(&self, key: &MetricKey) -> Result<(), SinkError> {
        self.log
            .lock()
            .unwrap()
            .flushed
            .push(key.as_str().to_string());
        Ok(())
    }
}

/// Sink whose every call fails.
#[derive(Debug, Default)]
pub struct FailingSink;

impl FailingSink {
    /// Create the sink.
    pub fn new() -> Self {
        Self
    }
}

impl MetricSinkPort for FailingSink {
    fn emit(&self, key: &MetricKey, _kind: MetricKind, _values: &[i64]) -> Result<(), SinkError> {
        Err(SinkError::rejected(key, "sink is failing"))
    }

    fn flush(&self, _key: &MetricKey) -> Result<(), SinkError> {
        Err(SinkError::Unavailable {
            reason: "sink is failing".into(),
        })
    }
}

/// Logger that keeps every event for later inspection.
///
/// Children share the parent's store; their base fields are merged into each
/// captured event, event fields taking precedence.
#[derive(Debug, Default)]
pub struct CapturingLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
    base: LogFields,
}

impl CapturingLogger {
    /// Create an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured event.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured events named `name`.
    pub fn events_named(&self, name: &str) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event.as_ref() == name)
            .cloned()
            .collect()
    }
}

impl LoggerPort for CapturingLogger {
    fn log(&self, mut event: LogEvent) {
        if !self.base.is_empty() {
            let mut fields = self.base.clone();
            fields.extend(event.fields.take().unwrap_or_default());
            event.fields = Some(fields);
        }
        self.events.lock().unwrap().push(event);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base = self.base.clone();
        base.extend(fields);
        Box::new(Self {
            events: Arc::clone(&self.events),
            base,
        })
    }
}

/// Identity lookup that always fails.
#[derive(Debug, Clone)]
pub struct FailingIdentity {
    reason: Box<str>,
}

impl FailingIdentity {
    /// Fail every lookup with `reason`.
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl IdentityPort for FailingIdentity {
    fn current_user_id(&self) -> Result<UserId, IdentityError> {
        Err(IdentityError::Unavailable {
            reason: self.reason.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_readings() {
        let clock = ManualClock::new(5);
        clock.advance(2);
        clock.advance_nanos(10);
        assert_eq!(clock.now_millis(), 7);
        assert_eq!(clock.precise_nanos(), 7 * NANOS_PER_MILLI + 10);
    }

    #[test]
    fn recording_sink_checks_arity() {
        let sink = RecordingSink::new();
        let key = MetricKey::parse("a").unwrap();
        assert!(sink.emit(&key, MetricKind::ElapsedCpu, &[1]).is_err());
        assert!(sink.emit(&key, MetricKind::Gauge, &[1]).is_ok());
        assert_eq!(sink.emissions_for(&key), vec![(MetricKind::Gauge, vec![1])]);
    }

    #[test]
    fn capturing_logger_children_share_events() {
        let logger = CapturingLogger::new();
        let mut base = LogFields::new();
        base.insert("client".into(), "default".into());
        let child = logger.child(base);
        child.info("client.ready", "ready", None);

        let events = logger.events_named("client.ready");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].fields.as_ref().and_then(|f| f.get("client")),
            Some(&serde_json::Value::from("default"))
        );
    }
}

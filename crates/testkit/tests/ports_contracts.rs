//! Contract-style tests for port traits using in-memory doubles.

use callmeter_ports::{
    Clock, CpuClock, IdentityPort, LogLevel, LoggerPort, MetricKey, MetricKind, MetricSinkPort,
};
use callmeter_shared::ErrorEnvelope;
use callmeter_testkit::in_memory::{
    CapturingLogger, FailingIdentity, FailingSink, FixedCpuClock, ManualClock, RecordingSink,
};
use std::sync::Arc;

#[test]
fn sink_port_contract_smoke() -> Result<(), Box<dyn std::error::Error>> {
    let sink: Arc<dyn MetricSinkPort> = Arc::new(RecordingSink::new());
    let key = MetricKey::parse("server/rpc/login")?;

    sink.emit(&key, MetricKind::ElapsedCpu, &[12, 400])?;
    sink.emit(&key, MetricKind::CounterDelta, &[1])?;
    sink.flush(&key)?;
    assert!(sink.emit(&key, MetricKind::Gauge, &[]).is_err());

    let failing: Arc<dyn MetricSinkPort> = Arc::new(FailingSink::new());
    let rejected = failing
        .emit(&key, MetricKind::Gauge, &[1])
        .err()
        .ok_or("expected failure")?;
    let error = ErrorEnvelope::from(rejected);
    assert_eq!(
        error.metadata.get("metricKey").map(String::as_str),
        Some("server/rpc/login")
    );
    assert!(failing.flush(&key).is_err());
    Ok(())
}

#[test]
fn clocks_are_deterministic() {
    let clock = ManualClock::new(1_000);
    let cpu = FixedCpuClock::new(0);
    let before = clock.precise_nanos();

    clock.advance(25);
    cpu.advance(300);

    assert_eq!(clock.now_millis(), 1_025);
    assert_eq!(clock.precise_nanos() - before, 25_000_000);
    assert_eq!(cpu.current_thread_cpu_nanos(), 300);
}

#[test]
fn identity_port_contract_smoke() {
    let identity: Arc<dyn IdentityPort> = Arc::new(FailingIdentity::new("directory offline"));
    let error = identity.current_user_id().err();
    assert!(error.is_some_and(|error| error.to_string().contains("directory offline")));
}

#[test]
fn logger_port_contract_smoke() {
    let logger = CapturingLogger::new();
    let envelope = ErrorEnvelope::from(std::io::Error::other("pipe closed"));

    logger.failure(LogLevel::Warn, "sink.emit_failed", &envelope, None);
    logger.debug("timer.started", "started", None);

    let events = logger.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events.first().map(|event| event.level), Some(LogLevel::Warn));
    assert!(events.first().is_some_and(|event| event.error.is_some()));
}

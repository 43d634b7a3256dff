//! # callmeter-adapters
//!
//! Adapter implementations for ports (clocks, metric sinks, loggers, identity).
//! This crate depends on `ports` and `shared` only.

pub mod clock;
pub mod identity;
pub mod log_sink;
pub mod logger;
pub mod metric_sink;
pub mod tracing_logger;

pub use clock::{SystemClock, ThreadCpuClock, ZeroCpuClock};
pub use identity::{AnonymousIdentity, ScopedIdentity, StaticIdentity, ThreadUserGuard};
pub use log_sink::{LogSink, StderrLogSink, StdoutLogSink, WriterLogSink};
pub use logger::JsonLogger;
pub use metric_sink::{FanoutMetricSink, JsonMetricSink, MetricTags, NoopMetricSink};
pub use tracing_logger::TracingLogger;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use callmeter_ports::ports_crate_version;
    use callmeter_shared::shared_crate_version;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
                continue;
            }
            if in_deps && line.starts_with("callmeter-") {
                let key = line.split('=').next().unwrap_or("").trim();
                let name = key.split('.').next().unwrap_or("").trim();
                deps.push(name.to_string());
            }
        }

        deps
    }

    #[test]
    fn adapters_do_not_depend_on_engine_or_config() {
        let deps = workspace_deps();
        let forbidden = ["callmeter-engine", "callmeter-config"];

        for dep in &deps {
            assert!(
                !forbidden.contains(&dep.as_str()),
                "forbidden dependency found: {dep}"
            );
        }
    }

    #[test]
    fn adapters_can_use_ports_and_shared() {
        assert!(!adapters_crate_version().is_empty());
        assert!(!ports_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}

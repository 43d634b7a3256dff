//! # callmeter-engine
//!
//! Call instrumentation engine.
//!
//! - **Windowed metrics** - halving averages, points and counters that expire
//!   after a validity window
//! - **Nested timer** - per-context wall/CPU frame stacks
//! - **Timer client** - named façade recording into a registry and a sink
//! - **Dispatcher** - wraps RPC, HTTP and async calls with timing,
//!   concurrency, error and overhead metrics
//! - **Caches** - key concatenation memo and rolling snapshot history
//!
//! ## Dependency Rules
//!
//! - Depends on `domain`, `ports`, `config` and `shared`
//! - Concrete clocks, sinks and loggers come from `adapters` at the edge

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod cache;
pub mod client;
pub mod dispatcher;
pub mod registry;
pub mod timer;
pub mod windowed;

mod context;

pub use cache::{CacheStats, ConcatenationCache, HistoryBuffer, HistoryError, HistoryRow, OrderKey};
pub use client::{EngineDeps, TimerClient, TimerClientRegistry};
pub use context::{in_task_scope, scope};
pub use dispatcher::{HttpRequestLine, InstrumentedDispatcher, InvocationPhase, RequestLine};
pub use registry::MetricRegistry;
pub use timer::NestedCallTimer;
pub use windowed::{AverageMetric, CounterMetric, MetricWindow, PointMetric};

/// Returns the engine crate version.
#[must_use]
pub const fn engine_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

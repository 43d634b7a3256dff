//! # callmeter-ports
//!
//! Port traits for the callmeter hexagonal architecture.
//!
//! The instrumentation engine consumes exactly these capabilities: a clock, a
//! per-thread CPU-time reader, an identity lookup, a metric sink, and a
//! structured logger. It depends only on `domain` and `shared`.

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod clock;
pub mod identity;
pub mod logger;
pub mod sink;

pub use clock::*;
pub use identity::*;
pub use logger::*;
pub use sink::*;

// Re-export domain types used in port signatures, so adapter crates can
// implement ports without directly depending on `callmeter-domain`.
pub use callmeter_domain::{MetricKey, MetricKind, UserId};

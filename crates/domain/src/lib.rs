//! # callmeter-domain
//!
//! Value objects for call instrumentation:
//!
//! - **Primitives** - `ComponentKey`, `InvocationType`, `OperationName`, `UserId`
//! - **Keys** - `MetricKey` and the composite key builders
//! - **Timing** - `TimedFrame`, `TimerReading`, `TimerMismatch`
//! - **Metrics** - `MetricKind`, `MetricFamily`, `MetricReading`
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No infrastructure or adapter dependencies
//! - Pure domain logic with no I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub use callmeter_shared::shared_crate_version;

// =============================================================================
// DOMAIN MODULES
// =============================================================================

pub mod keys;
pub mod metric;
pub mod primitives;
pub mod timing;

pub use keys::{
    CONCURRENCY_SUFFIX, CPU_SUFFIX, ERRORS_SUFFIX, INVALID_SUFFIX, KEY_SEPARATOR, MetricKey,
    OVERHEAD_SUFFIX, TOTAL_SUFFIX, operation_key, site_key, site_prefix, user_key, user_segment,
};
pub use metric::{MetricFamily, MetricKind, MetricReading};
pub use primitives::{ComponentKey, InvocationType, OperationName, PrimitiveError, UserId};
pub use timing::{TimedFrame, TimerMismatch, TimerReading};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

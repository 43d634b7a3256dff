//! # callmeter-shared
//!
//! Shared utilities, result types, and error handling for the callmeter workspace.
//!
//! This crate provides foundational types that are used across all other crates:
//!
//! - Result and error envelope types
//! - Concurrency primitives (in-flight counters, correlation ids)
//! - Secret redaction for structured log fields
//!
//! ## Design Principles
//!
//! 1. **No workspace dependencies** - This crate only depends on external crates
//! 2. **Zero-cost abstractions** - Types should compile away to efficient code
//! 3. **Serde-compatible** - Error types support serialization

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod concurrency;
pub mod errors;
pub mod redaction;
pub mod result;

pub use concurrency::{CorrelationId, InFlightCounter, InFlightGuard};
pub use errors::{
    ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata, REDACTED_VALUE, UnexpectedError,
    normalize_unexpected_error, redact_metadata,
};
pub use redaction::{REDACTED, is_secret_key, redact_if_secret};
pub use result::{Result, ResultExt};

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

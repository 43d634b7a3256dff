//! # callmeter-testkit
//!
//! Test doubles and fixtures.
//! This crate depends on `ports`, `domain` and `shared`.

pub mod errors;
pub mod in_memory;

pub use in_memory::{
    CapturingLogger, FailingIdentity, FailingSink, FixedCpuClock, ManualClock, NoopLogger,
    RecordingSink,
};

/// Returns the testkit crate version.
#[must_use]
pub const fn testkit_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use callmeter_ports::ports_crate_version;
    use callmeter_shared::shared_crate_version;

    #[test]
    fn testkit_crate_compiles() {
        let version = testkit_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn testkit_can_use_ports_and_shared() {
        assert!(!ports_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }

    #[test]
    fn error_fixtures_are_available() {
        let codes = errors::common_error_codes();
        assert!(!codes.is_empty());
    }

    #[test]
    fn in_memory_doubles_are_available() {
        let _ = NoopLogger::default();
        assert!(RecordingSink::new().is_empty());
    }
}

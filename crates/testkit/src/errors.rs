//! Test fixtures for shared error codes and envelopes.

use callmeter_ports::{IdentityError, SinkError};
use callmeter_shared::{ErrorCode, ErrorEnvelope};

/// Return a list of common error codes used in tests.
pub fn common_error_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::invalid_input(),
        ErrorCode::not_found(),
        ErrorCode::unsupported(),
        ErrorCode::io(),
        ErrorCode::internal(),
    ]
}

/// An invalid input error fixture.
pub fn invalid_input_error() -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid input")
}

/// A sink outage fixture.
pub fn sink_unavailable_error() -> SinkError {
    SinkError::Unavailable {
        reason: "exporter shut down".into(),
    }
}

/// An identity outage fixture.
pub fn identity_unavailable_error() -> IdentityError {
    IdentityError::Unavailable {
        reason: "directory offline".into(),
    }
}

//! Integration tests for shared error propagation.

use callmeter_shared::{ErrorCode, ErrorEnvelope, ErrorKind, UnexpectedError, normalize_unexpected_error};
use callmeter_testkit::errors::{
    identity_unavailable_error, invalid_input_error, sink_unavailable_error,
};

#[test]
fn port_errors_cross_into_envelopes() {
    let sink = ErrorEnvelope::from(sink_unavailable_error());
    assert_eq!(sink.code.namespace(), "sink");
    assert_eq!(sink.kind, ErrorKind::Unexpected);

    let identity = ErrorEnvelope::from(identity_unavailable_error());
    assert_eq!(identity.code, ErrorCode::new("identity", "lookup_failed"));

    let boxed: Box<dyn std::error::Error> = Box::new(identity);
    assert!(boxed.to_string().contains("directory offline"));
}

#[test]
fn normalize_unexpected_error_is_available() {
    let envelope = normalize_unexpected_error(UnexpectedError::message("boom"));
    assert_eq!(envelope.code, ErrorCode::internal());
    assert_eq!(envelope.kind, ErrorKind::Unexpected);
}

#[test]
fn error_envelope_constructors_work() {
    assert_eq!(invalid_input_error().kind, ErrorKind::Expected);
}

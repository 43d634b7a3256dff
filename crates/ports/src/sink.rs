//! Metric sink boundary contract.

use callmeter_domain::{MetricKey, MetricKind};
use callmeter_shared::{ErrorCode, ErrorEnvelope};

/// Failure reported by a metric sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The sink refused or failed to record an emission.
    #[error("sink rejected `{key}`: {reason}")]
    Rejected {
        /// Metric key of the emission.
        key: Box<str>,
        /// Sink-provided reason.
        reason: Box<str>,
    },
    /// Values do not match the arity of the metric kind.
    #[error("`{key}` expects {expected} value(s) for {kind}, got {actual}")]
    InvalidValues {
        /// Metric key of the emission.
        key: Box<str>,
        /// Declared metric kind.
        kind: MetricKind,
        /// Arity required by the kind.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
    /// The sink transport is gone (closed pipe, shut down exporter).
    #[error("sink unavailable: {reason}")]
    Unavailable {
        /// Transport-provided reason.
        reason: Box<str>,
    },
}

impl SinkError {
    /// Build a rejection for `key`.
    pub fn rejected(key: &MetricKey, reason: impl Into<Box<str>>) -> Self {
        Self::Rejected {
            key: key.as_str().into(),
            reason: reason.into(),
        }
    }

    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Rejected { .. } => ErrorCode::new("sink", "emit_failed"),
            Self::InvalidValues { .. } => ErrorCode::new("sink", "invalid_values"),
            Self::Unavailable { .. } => ErrorCode::new("sink", "unavailable"),
        }
    }
}

impl From<SinkError> for ErrorEnvelope {
    fn from(error: SinkError) -> Self {
        let envelope = Self::unexpected(error.error_code(), error.to_string());
        match error {
            SinkError::Rejected { key, .. } => envelope.with_metadata("metricKey", key),
            SinkError::InvalidValues {
                key,
                kind,
                expected,
                actual,
            } => envelope
                .with_metadata("metricKey", key)
                .with_metadata("kind", kind.as_str())
                .with_metadata("expected", expected.to_string())
                .with_metadata("actual", actual.to_string()),
            SinkError::Unavailable { .. } => envelope,
        }
    }
}

/// Check that `values` carries exactly the arity `kind` requires.
pub fn check_arity(key: &MetricKey, kind: MetricKind, values: &[i64]) -> Result<(), SinkError> {
    let expected = kind.arity();
    if values.len() == expected {
        return Ok(());
    }
    Err(SinkError::InvalidValues {
        key: key.as_str().into(),
        kind,
        expected,
        actual: values.len(),
    })
}

/// Boundary contract for publishing metric updates.
///
/// Implementations must not block on slow transports; callers treat every
/// error as non-fatal and log it.
pub trait MetricSinkPort: Send + Sync {
    /// Record one update for `key`.
    fn emit(&self, key: &MetricKey, kind: MetricKind, values: &[i64]) -> Result<(), SinkError>;

    /// Push any buffered updates for `key` downstream.
    fn flush(&self, key: &MetricKey) -> Result<(), SinkError> {
        let _ = key;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_is_checked_per_kind() -> Result<(), Box<dyn std::error::Error>> {
        let key = MetricKey::parse("server/rpc/login")?;
        check_arity(&key, MetricKind::ElapsedCpu, &[1, 2])?;
        check_arity(&key, MetricKind::Gauge, &[3])?;

        let error = check_arity(&key, MetricKind::Counter, &[1, 2]).err();
        assert_eq!(
            error,
            Some(SinkError::InvalidValues {
                key: "server/rpc/login".into(),
                kind: MetricKind::Counter,
                expected: 1,
                actual: 2,
            })
        );
        Ok(())
    }

    #[test]
    fn sink_errors_map_to_envelopes() -> Result<(), Box<dyn std::error::Error>> {
        let key = MetricKey::parse("server/rpc/login")?;
        let envelope: ErrorEnvelope = SinkError::rejected(&key, "queue full").into();
        assert_eq!(envelope.code.to_string(), "sink:emit_failed");
        assert_eq!(
            envelope.metadata.get("metricKey").map(String::as_str),
            Some("server/rpc/login")
        );
        Ok(())
    }
}

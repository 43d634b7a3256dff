//! Result helpers for shared error handling.

use crate::errors::ErrorEnvelope;

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Extension helpers used by instrumentation code paths.
pub trait ResultExt<T, E> {
    /// Map the success value, preserving the error.
    fn map_ok<U, F>(self, op: F) -> Result<U, E>
    where
        F: FnOnce(T) -> U;

    /// Discard the error after handing it to `observer`.
    ///
    /// Used where a failure must be reported but never propagated.
    fn swallow_with<F>(self, observer: F) -> Option<T>
    where
        F: FnOnce(E);
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn map_ok<U, F>(self, op: F) -> Result<U, E>
    where
        F: FnOnce(T) -> U,
    {
        self.map(op)
    }

    fn swallow_with<F>(self, observer: F) -> Option<T>
    where
        F: FnOnce(E),
    {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                observer(error);
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCode, ErrorEnvelope};

    #[test]
    fn result_ext_maps_ok() {
        let value: Result<i32> = Ok(1);
        let mapped = value.map_ok(|value| value + 2);

        assert!(matches!(mapped, Ok(3)));
    }

    #[test]
    fn swallow_with_reports_error_once() {
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad input");
        let value: Result<i32> = Err(error);
        let mut seen = Vec::new();
        let out = value.swallow_with(|error| seen.push(error.code.code().to_string()));

        assert!(out.is_none());
        assert_eq!(seen, vec!["invalid_input".to_string()]);
    }

    #[test]
    fn swallow_with_passes_success_through() {
        let value: Result<i32> = Ok(7);
        let out = value.swallow_with(|_| {});
        assert_eq!(out, Some(7));
    }
}

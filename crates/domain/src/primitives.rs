//! Domain primitives with validated constructors.

use callmeter_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// `ComponentKey` is empty after trimming.
    InvalidComponentKey {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `InvocationType` is empty after trimming.
    InvalidInvocationType {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `OperationName` is empty after trimming.
    InvalidOperationName {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `UserId` is empty after trimming.
    InvalidUserId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `MetricKey` is empty after trimming.
    InvalidMetricKey {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `ComponentKey` or `InvocationType` contains the key separator.
    SeparatorInSegment {
        /// Segment that failed validation.
        input: String,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidComponentKey { .. } => ErrorCode::new("domain", "invalid_component_key"),
            Self::InvalidInvocationType { .. } => {
                ErrorCode::new("domain", "invalid_invocation_type")
            },
            Self::InvalidOperationName { .. } => {
                ErrorCode::new("domain", "invalid_operation_name")
            },
            Self::InvalidUserId { .. } => ErrorCode::new("domain", "invalid_user_id"),
            Self::InvalidMetricKey { .. } => ErrorCode::new("domain", "invalid_metric_key"),
            Self::SeparatorInSegment { .. } => ErrorCode::new("domain", "separator_in_segment"),
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidComponentKey { .. } => formatter.write_str("ComponentKey must be non-empty"),
            Self::InvalidInvocationType { .. } => {
                formatter.write_str("InvocationType must be non-empty")
            },
            Self::InvalidOperationName { .. } => {
                formatter.write_str("OperationName must be non-empty")
            },
            Self::InvalidUserId { .. } => formatter.write_str("UserId must be non-empty"),
            Self::InvalidMetricKey { .. } => formatter.write_str("MetricKey must be non-empty"),
            Self::SeparatorInSegment { .. } => {
                formatter.write_str("key segment must not contain '/'")
            },
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            PrimitiveError::InvalidComponentKey { input_length }
            | PrimitiveError::InvalidInvocationType { input_length }
            | PrimitiveError::InvalidOperationName { input_length }
            | PrimitiveError::InvalidUserId { input_length }
            | PrimitiveError::InvalidMetricKey { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::SeparatorInSegment { input } => envelope.with_metadata("input", input),
        }
    }
}

fn trimmed_non_empty(
    input: &str,
    on_empty: impl FnOnce(usize) -> PrimitiveError,
) -> Result<&str, PrimitiveError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(on_empty(input.len()));
    }
    Ok(trimmed)
}

fn reject_separator(segment: &str) -> Result<(), PrimitiveError> {
    if segment.contains(crate::KEY_SEPARATOR) {
        return Err(PrimitiveError::SeparatorInSegment {
            input: segment.to_string(),
        });
    }
    Ok(())
}

/// Logical component owning a set of instrumented call-sites (e.g. `server`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentKey(Box<str>);

impl ComponentKey {
    /// Parse a component key. Must be non-empty and free of `/`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = trimmed_non_empty(input.as_ref(), |input_length| {
            PrimitiveError::InvalidComponentKey { input_length }
        })?;
        reject_separator(trimmed)?;
        Ok(Self(trimmed.into()))
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ComponentKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Kind of invocation being measured: `rpc`, or an HTTP method such as `GET`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationType(Box<str>);

impl InvocationType {
    /// Parse an invocation type. Must be non-empty and free of `/`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = trimmed_non_empty(input.as_ref(), |input_length| {
            PrimitiveError::InvalidInvocationType { input_length }
        })?;
        reject_separator(trimmed)?;
        Ok(Self(trimmed.into()))
    }

    /// Invocation type used for remote-call handlers.
    #[must_use]
    pub fn rpc() -> Self {
        Self("rpc".into())
    }

    /// `GET`, used when a request's own method cannot form a key.
    #[must_use]
    pub fn http_get() -> Self {
        Self("GET".into())
    }

    /// Invocation type for an HTTP request; the method is upper-cased.
    pub fn http_method(method: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let parsed = Self::parse(method)?;
        Ok(Self(parsed.0.to_ascii_uppercase().into_boxed_str()))
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for InvocationType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for InvocationType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Name of one instrumented operation (method name or request path).
///
/// Operations may contain `/` since HTTP paths are used verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationName(Box<str>);

impl OperationName {
    /// Parse an operation name. Must be non-empty after trimming.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = trimmed_non_empty(input.as_ref(), |input_length| {
            PrimitiveError::InvalidOperationName { input_length }
        })?;
        Ok(Self(trimmed.into()))
    }

    /// Placeholder recorded for a request whose path cannot name an operation.
    #[must_use]
    pub fn unresolved() -> Self {
        Self(crate::keys::INVALID_SUFFIX.into())
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for OperationName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identity of the caller an invocation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Box<str>);

impl UserId {
    /// Parse a user id. Must be non-empty after trimming.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = trimmed_non_empty(input.as_ref(), |input_length| {
            PrimitiveError::InvalidUserId { input_length }
        })?;
        Ok(Self(trimmed.into()))
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner boxed string.
    #[must_use]
    pub fn into_inner(self) -> Box<str> {
        self.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

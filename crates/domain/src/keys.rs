//! Metric keys and the composite key layout.
//!
//! Every metric emitted for an invocation is addressed by a `/`-separated key:
//!
//! - operation: `component/type/operation`
//! - user: `{user_prefix}{user_id}/component/type/operation`
//! - site aggregates: `component/type/_total`, `component/type/_concurrency`,
//!   `component/type/_overhead`
//! - per-operation children: `component/type/operation/_overhead`,
//!   `component/type/operation/_errors`
//!
//! The builders here are the uncached reference forms; the dispatcher goes
//! through a concatenation cache that must produce identical strings.

use crate::primitives::{ComponentKey, InvocationType, OperationName, PrimitiveError, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Separator between key segments.
pub const KEY_SEPARATOR: char = '/';
/// Suffix of the per-site concurrency gauge.
pub const CONCURRENCY_SUFFIX: &str = "_concurrency";
/// Suffix of the per-site total elapsed aggregate.
pub const TOTAL_SUFFIX: &str = "_total";
/// Suffix of instrumentation overhead keys.
pub const OVERHEAD_SUFFIX: &str = "_overhead";
/// Suffix of the per-operation error counter.
pub const ERRORS_SUFFIX: &str = "_errors";
/// Operation segment used when a request path cannot name an operation.
pub const INVALID_SUFFIX: &str = "_invalid";
/// Suffix of the CPU-time statistic kept next to an elapsed statistic.
pub const CPU_SUFFIX: &str = "_cpu";

/// Name of one metric. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricKey(Arc<str>);

impl MetricKey {
    /// Parse a metric key. Must be non-empty after trimming.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::InvalidMetricKey {
                input_length: raw.len(),
            });
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Wrap an already shared string without copying it.
    pub fn from_shared(value: Arc<str>) -> Result<Self, PrimitiveError> {
        if value.trim().is_empty() {
            return Err(PrimitiveError::InvalidMetricKey {
                input_length: value.len(),
            });
        }
        Ok(Self(value))
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shared handle to the underlying string.
    #[must_use]
    pub fn shared(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }

    /// Key of a child metric: `self/suffix`.
    #[must_use]
    pub fn child(&self, suffix: &str) -> Self {
        Self(Arc::from(format!("{}{KEY_SEPARATOR}{suffix}", self.0)))
    }
}

impl AsRef<str> for MetricKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// `component/type/`, the left half of every per-operation key.
#[must_use]
pub fn site_prefix(component: &ComponentKey, invocation_type: &InvocationType) -> String {
    format!("{component}{KEY_SEPARATOR}{invocation_type}{KEY_SEPARATOR}")
}

/// `{user_prefix}{user_id}/`, the left half of every per-user key.
#[must_use]
pub fn user_segment(user_prefix: &str, user: &UserId) -> String {
    format!("{user_prefix}{user}{KEY_SEPARATOR}")
}

/// Operation key: `component/type/operation`.
#[must_use]
pub fn operation_key(
    component: &ComponentKey,
    invocation_type: &InvocationType,
    operation: &OperationName,
) -> MetricKey {
    let mut key = site_prefix(component, invocation_type);
    key.push_str(operation.as_str());
    MetricKey(Arc::from(key))
}

/// User key: `{user_prefix}{user_id}/{operation_key}`.
#[must_use]
pub fn user_key(user_prefix: &str, user: &UserId, operation_key: &MetricKey) -> MetricKey {
    let mut key = user_segment(user_prefix, user);
    key.push_str(operation_key.as_str());
    MetricKey(Arc::from(key))
}

/// Site-wide aggregate key: `component/type/suffix`.
#[must_use]
pub fn site_key(
    component: &ComponentKey,
    invocation_type: &InvocationType,
    suffix: &str,
) -> MetricKey {
    let mut key = site_prefix(component, invocation_type);
    key.push_str(suffix);
    MetricKey(Arc::from(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn segment_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,12}"
    }

    #[test]
    fn builds_documented_layout() -> Result<(), PrimitiveError> {
        let component = ComponentKey::parse("server")?;
        let rpc = InvocationType::rpc();
        let op = OperationName::parse("login")?;
        let user = UserId::parse("alice")?;

        let op_key = operation_key(&component, &rpc, &op);
        assert_eq!(op_key.as_str(), "server/rpc/login");
        assert_eq!(
            user_key("user:", &user, &op_key).as_str(),
            "user:alice/server/rpc/login"
        );
        assert_eq!(
            site_key(&component, &rpc, CONCURRENCY_SUFFIX).as_str(),
            "server/rpc/_concurrency"
        );
        assert_eq!(
            op_key.child(OVERHEAD_SUFFIX).as_str(),
            "server/rpc/login/_overhead"
        );
        Ok(())
    }

    #[test]
    fn metric_key_rejects_blank_input() {
        assert_eq!(
            MetricKey::parse(" "),
            Err(PrimitiveError::InvalidMetricKey { input_length: 1 })
        );
        assert!(MetricKey::from_shared(Arc::from("")).is_err());
    }

    #[test]
    fn metric_key_serializes_as_plain_string() -> Result<(), Box<dyn std::error::Error>> {
        let key = MetricKey::parse("server/rpc/login")?;
        let encoded = serde_json::to_string(&key)?;
        assert_eq!(encoded, "\"server/rpc/login\"");
        let decoded: MetricKey = serde_json::from_str(&encoded)?;
        assert_eq!(decoded, key);
        Ok(())
    }

    #[test]
    fn unresolved_operation_keys_under_the_site() -> Result<(), PrimitiveError> {
        let component = ComponentKey::parse("server")?;
        let key = operation_key(
            &component,
            &InvocationType::http_get(),
            &OperationName::unresolved(),
        );
        assert_eq!(key.as_str(), "server/GET/_invalid");
        Ok(())
    }

    proptest! {
        #[test]
        fn operation_key_is_prefix_concatenation(
            component in segment_strategy(),
            kind in segment_strategy(),
            op in segment_strategy(),
        ) {
            let component = ComponentKey::parse(&component).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let kind = InvocationType::parse(&kind).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let op = OperationName::parse(&op).map_err(|e| TestCaseError::fail(e.to_string()))?;

            let key = operation_key(&component, &kind, &op);
            let expected = format!("{}{}", site_prefix(&component, &kind), op);
            prop_assert_eq!(key.as_str(), expected.as_str());
            prop_assert_eq!(key.as_str().split(KEY_SEPARATOR).count(), 3);
        }

        #[test]
        fn user_key_ends_with_operation_key(
            prefix in "[a-z]{0,6}:?",
            user in segment_strategy(),
            op in segment_strategy(),
        ) {
            let user = UserId::parse(&user).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let op_key = MetricKey::parse(&op).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let key = user_key(&prefix, &user, &op_key);
            prop_assert!(key.as_str().starts_with(prefix.as_str()));
            let suffix = format!("/{op}");
            prop_assert!(key.as_str().ends_with(suffix.as_str()));
        }
    }
}

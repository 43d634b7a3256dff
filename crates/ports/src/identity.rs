//! Caller identity lookup.

use callmeter_domain::{PrimitiveError, UserId};
use callmeter_shared::{ErrorCode, ErrorEnvelope};

/// Failure resolving the current caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The identity locator could not be reached.
    #[error("identity lookup failed: {reason}")]
    Unavailable {
        /// Locator-provided reason.
        reason: Box<str>,
    },
    /// The locator returned something that is not a valid user id.
    #[error("identity lookup returned an invalid user id: {0}")]
    Invalid(PrimitiveError),
}

impl From<IdentityError> for ErrorEnvelope {
    fn from(error: IdentityError) -> Self {
        Self::unexpected(ErrorCode::new("identity", "lookup_failed"), error.to_string())
    }
}

/// Resolves the user an invocation runs on behalf of.
pub trait IdentityPort: Send + Sync {
    /// Current caller, as seen from the calling execution context.
    fn current_user_id(&self) -> Result<UserId, IdentityError>;
}

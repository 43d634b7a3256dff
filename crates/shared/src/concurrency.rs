//! Concurrency primitives shared by instrumented call-sites.
//!
//! - `InFlightCounter`: lock-free count of invocations currently executing at
//!   one call-site, paired with an RAII guard so the decrement can never be
//!   skipped (including on panic unwind).
//! - `CorrelationId`: best-effort unique identifiers used to tie log events of
//!   one invocation together.

use crate::{ErrorCode, ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A correlation identifier used for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier from user input.
    ///
    /// The value is trimmed; empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlationId must be non-empty",
            ));
        }
        Ok(Self(Arc::<str>::from(trimmed)))
    }

    /// Create a new invocation id, best-effort unique within this process.
    #[must_use]
    pub fn new_invocation_id() -> Self {
        let n = INVOCATION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::<str>::from(format!("inv_{n}")))
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static INVOCATION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Number of invocations currently in flight at one call-site.
#[derive(Debug, Default)]
pub struct InFlightCounter {
    in_flight: AtomicU64,
}

impl InFlightCounter {
    /// Create a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_flight: AtomicU64::new(0),
        }
    }

    /// Register one more in-flight invocation.
    ///
    /// The returned guard carries the post-increment level and decrements the
    /// counter exactly once when dropped.
    pub fn enter(&self) -> InFlightGuard<'_> {
        let level = self.in_flight.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        InFlightGuard {
            counter: self,
            level,
        }
    }

    /// Current number of in-flight invocations.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    fn leave(&self) {
        // Guards are the only decrement path, so this never underflows.
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// RAII registration of one in-flight invocation.
#[derive(Debug)]
#[must_use = "dropping the guard immediately ends the in-flight registration"]
pub struct InFlightGuard<'a> {
    counter: &'a InFlightCounter,
    level: u64,
}

impl InFlightGuard<'_> {
    /// Concurrency level observed right after this invocation was counted.
    #[must_use]
    pub const fn level(&self) -> u64 {
        self.level
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn guard_decrements_on_drop() {
        let counter = InFlightCounter::new();
        {
            let first = counter.enter();
            let second = counter.enter();
            assert_eq!(first.level(), 1);
            assert_eq!(second.level(), 2);
            assert_eq!(counter.current(), 2);
        }
        assert_eq!(counter.current(), 0);
    }

    #[test]
    fn guard_decrements_on_panic_unwind() {
        let counter = InFlightCounter::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = counter.enter();
            std::panic::panic_any("handler blew up");
        }));
        assert!(outcome.is_err());
        assert_eq!(counter.current(), 0);
    }

    #[test]
    fn concurrent_entries_observe_distinct_levels() -> std::result::Result<(), &'static str> {
        const WORKERS: usize = 8;
        let counter = InFlightCounter::new();
        let barrier = Barrier::new(WORKERS);

        let levels: BTreeSet<u64> = thread::scope(|scope| {
            let handles: Vec<_> = (0..WORKERS)
                .map(|_| {
                    scope.spawn(|| {
                        let guard = counter.enter();
                        let level = guard.level();
                        // Hold every guard until all workers are in flight.
                        barrier.wait();
                        level
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| "worker panicked"))
                .collect::<std::result::Result<_, _>>()
        })?;

        let expected: BTreeSet<u64> = (1..=WORKERS as u64).collect();
        assert_eq!(levels, expected);
        assert_eq!(counter.current(), 0);
        Ok(())
    }

    #[test]
    fn correlation_id_rejects_empty_input() -> Result<()> {
        assert!(CorrelationId::parse("  ").is_err());
        let parsed = CorrelationId::parse(" inv_9 ")?;
        assert_eq!(parsed.as_str(), "inv_9");
        Ok(())
    }

    #[test]
    fn invocation_ids_are_unique() {
        let first = CorrelationId::new_invocation_id();
        let second = CorrelationId::new_invocation_id();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("inv_"));
    }
}

//! Timing frames and readings produced by the nested call timer.

use callmeter_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};

/// One open timing bracket on an execution context's stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedFrame {
    /// Name the frame was started with.
    pub name: Box<str>,
    /// Wall clock at `start`, in milliseconds.
    pub start_wall_millis: i64,
    /// Thread CPU time at `start`, in nanoseconds (0 when unsupported).
    pub start_cpu_nanos: i64,
}

impl TimedFrame {
    /// Open a frame.
    pub fn new(name: impl Into<Box<str>>, start_wall_millis: i64, start_cpu_nanos: i64) -> Self {
        Self {
            name: name.into(),
            start_wall_millis,
            start_cpu_nanos,
        }
    }

    /// Close the frame at the given instant.
    #[must_use]
    pub const fn close(&self, end_wall_millis: i64, end_cpu_nanos: i64) -> TimerReading {
        TimerReading {
            start_wall_millis: self.start_wall_millis,
            end_wall_millis,
            start_cpu_nanos: self.start_cpu_nanos,
            end_cpu_nanos,
        }
    }
}

/// Bracketed measurement returned by a matched `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerReading {
    /// Wall clock at start, in milliseconds.
    pub start_wall_millis: i64,
    /// Wall clock at end, in milliseconds.
    pub end_wall_millis: i64,
    /// Thread CPU time at start, in nanoseconds.
    pub start_cpu_nanos: i64,
    /// Thread CPU time at end, in nanoseconds.
    pub end_cpu_nanos: i64,
}

impl TimerReading {
    /// Elapsed wall time in milliseconds, never negative.
    #[must_use]
    pub const fn elapsed_millis(&self) -> i64 {
        let delta = self.end_wall_millis.saturating_sub(self.start_wall_millis);
        if delta < 0 { 0 } else { delta }
    }

    /// CPU time spent in nanoseconds, never negative.
    ///
    /// A task resumed on another worker thread reads a different thread clock,
    /// so the raw delta can go negative; it is clamped to zero.
    #[must_use]
    pub const fn cpu_nanos(&self) -> i64 {
        let delta = self.end_cpu_nanos.saturating_sub(self.start_cpu_nanos);
        if delta < 0 { 0 } else { delta }
    }
}

/// Why an `end` call produced no reading.
///
/// The stack is unwound by exactly one frame in every case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerMismatch {
    /// `end` was called with no open frame.
    #[error("timer end `{expected}` called with no open frame")]
    Empty {
        /// Name passed to `end`.
        expected: Box<str>,
    },
    /// The popped frame was opened under another name.
    #[error("timer end `{expected}` popped frame `{found}`")]
    NameMismatch {
        /// Name passed to `end`.
        expected: Box<str>,
        /// Name of the frame that was discarded.
        found: Box<str>,
    },
}

impl From<TimerMismatch> for ErrorEnvelope {
    fn from(error: TimerMismatch) -> Self {
        let envelope =
            Self::expected(ErrorCode::new("timer", "mismatch"), error.to_string());
        match error {
            TimerMismatch::Empty { expected } => envelope.with_metadata("expected", expected),
            TimerMismatch::NameMismatch { expected, found } => envelope
                .with_metadata("expected", expected)
                .with_metadata("found", found),
        }
    }
}

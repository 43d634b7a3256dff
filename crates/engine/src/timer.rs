//! Nested call timer.
//!
//! `start`/`end` bracket named sections on the calling context's stack.
//! `end` pops exactly one frame whether or not the name matches, so an
//! unbalanced caller can never leave the stack growing.

use crate::context;
use callmeter_domain::{TimedFrame, TimerMismatch, TimerReading};
use callmeter_ports::{Clock, CpuClock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Stack-based wall and CPU timer, one stack per execution context.
#[derive(Clone)]
pub struct NestedCallTimer {
    id: u64,
    clock: Arc<dyn Clock>,
    cpu_clock: Arc<dyn CpuClock>,
}

impl NestedCallTimer {
    /// Create a timer with its own stacks in every execution context.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, cpu_clock: Arc<dyn CpuClock>) -> Self {
        Self {
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            clock,
            cpu_clock,
        }
    }

    /// Open a frame named `name`.
    pub fn start(&self, name: &str) {
        let frame = TimedFrame::new(
            name,
            self.clock.now_millis(),
            self.cpu_clock.current_thread_cpu_nanos(),
        );
        context::with_stack(self.id, |stack| stack.push(frame));
    }

    /// Drop the innermost frame without recording it.
    ///
    /// Returns whether a frame was open; an empty stack is not an error.
    pub fn cancel(&self) -> bool {
        context::with_stack(self.id, |stack| stack.pop().is_some())
    }

    /// Close the innermost frame, which must have been opened as `name`.
    pub fn end(&self, name: &str) -> Result<TimerReading, TimerMismatch> {
        let end_wall = self.clock.now_millis();
        let end_cpu = self.cpu_clock.current_thread_cpu_nanos();
        match context::with_stack(self.id, Vec::pop) {
            None => Err(TimerMismatch::Empty {
                expected: name.into(),
            }),
            Some(frame) if frame.name.as_ref() != name => Err(TimerMismatch::NameMismatch {
                expected: name.into(),
                found: frame.name,
            }),
            Some(frame) => Ok(frame.close(end_wall, end_cpu)),
        }
    }

    /// Current thread CPU time in nanoseconds, 0 when unsupported.
    pub fn current_cpu_time(&self) -> i64 {
        self.cpu_clock.current_thread_cpu_nanos()
    }

    /// Open frames in the calling context.
    pub fn depth(&self) -> usize {
        context::with_stack(self.id, |stack| stack.len())
    }

    /// Clock used for wall readings.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl std::fmt::Debug for NestedCallTimer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("NestedCallTimer")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

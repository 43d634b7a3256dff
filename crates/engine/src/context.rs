//! Per-execution-context timer stacks.
//!
//! Each worker thread lazily owns one set of stacks. An async task entered
//! through [`scope`] owns its own set instead, so it keeps its frames when the
//! runtime moves it between threads. Stacks are keyed by timer id, so timers
//! of different clients never see each other's frames.

use callmeter_domain::TimedFrame;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::future::Future;

#[derive(Debug, Default)]
pub(crate) struct TimerStacks {
    stacks: FxHashMap<u64, Vec<TimedFrame>>,
}

impl TimerStacks {
    /// Run `op` on the stack of `timer_id`; an emptied stack is dropped.
    fn with<R>(&mut self, timer_id: u64, op: impl FnOnce(&mut Vec<TimedFrame>) -> R) -> R {
        let stack = self.stacks.entry(timer_id).or_default();
        let result = op(stack);
        if stack.is_empty() {
            self.stacks.remove(&timer_id);
        }
        result
    }
}

thread_local! {
    static THREAD_STACKS: RefCell<TimerStacks> = RefCell::new(TimerStacks::default());
}

tokio::task_local! {
    static TASK_STACKS: RefCell<TimerStacks>;
}

/// Run `op` against the calling context's stack for `timer_id`.
pub(crate) fn with_stack<R>(timer_id: u64, op: impl FnOnce(&mut Vec<TimedFrame>) -> R) -> R {
    if in_task_scope() {
        TASK_STACKS.with(|cell| cell.borrow_mut().with(timer_id, op))
    } else {
        THREAD_STACKS.with(|cell| cell.borrow_mut().with(timer_id, op))
    }
}

/// Whether the caller runs inside a [`scope`].
pub fn in_task_scope() -> bool {
    TASK_STACKS.try_with(|_| ()).is_ok()
}

/// Run `future` with fresh timer stacks bound to its task.
pub async fn scope<F>(future: F) -> F::Output
where
    F: Future,
{
    TASK_STACKS
        .scope(RefCell::new(TimerStacks::default()), future)
        .await
}

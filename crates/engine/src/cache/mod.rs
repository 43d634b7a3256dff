//! Bounded caches used around the dispatcher.

pub mod concat;
pub mod history;

pub use concat::{CacheStats, ConcatenationCache};
pub use history::{HistoryBuffer, HistoryError, HistoryRow, OrderKey};

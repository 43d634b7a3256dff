//! Rolling history of sampled snapshots.
//!
//! Entries are ordered by an order key and capped at a fixed size; pushing
//! into a full buffer evicts the smallest key first.
//!
//! Two key strategies exist. [`HistoryKeyKind::Numeric`] keys are strictly
//! increasing millisecond stamps and order chronologically. The legacy
//! [`HistoryKeyKind::LexicalTimestamp`] keys are `h:mm:ss AM` strings: they
//! sort lexically (`10:00:00` before `9:00:00`) and collide within a second,
//! so eviction can drop a newer entry before an older one. Kept for
//! compatibility only.

use callmeter_config::HistoryKeyKind;
use callmeter_ports::Clock;
use callmeter_shared::{ErrorCode, ErrorEnvelope};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// Key a history entry is ordered by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum OrderKey {
    /// Strictly increasing millisecond stamp.
    Numeric(i64),
    /// Legacy formatted wall-clock time.
    Lexical(Box<str>),
}

impl fmt::Display for OrderKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(stamp) => write!(formatter, "{stamp}"),
            Self::Lexical(stamp) => formatter.write_str(stamp),
        }
    }
}

/// Failure pushing into a history buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// A lexical key matched an entry already retained.
    #[error("history key `{key}` already holds an entry")]
    KeyCollision {
        /// The colliding key.
        key: Box<str>,
    },
}

impl From<HistoryError> for ErrorEnvelope {
    fn from(error: HistoryError) -> Self {
        let envelope = Self::expected(ErrorCode::new("history", "key_collision"), error.to_string());
        match error {
            HistoryError::KeyCollision { key } => envelope.with_metadata("orderKey", key),
        }
    }
}

/// One row of a rendered history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow<R> {
    /// Key of the snapshot the row came from.
    pub order_key: OrderKey,
    /// The row itself.
    pub row: R,
}

#[derive(Debug)]
struct HistoryState<R> {
    entries: BTreeMap<OrderKey, Vec<R>>,
    last_numeric: i64,
}

/// Bounded, key-ordered history of row snapshots.
pub struct HistoryBuffer<R> {
    capacity: NonZeroUsize,
    key_kind: HistoryKeyKind,
    clock: Arc<dyn Clock>,
    state: Mutex<HistoryState<R>>,
}

impl<R: Clone> HistoryBuffer<R> {
    /// Create a buffer retaining at most `capacity` snapshots.
    #[must_use]
    pub fn new(capacity: NonZeroUsize, key_kind: HistoryKeyKind, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            key_kind,
            clock,
            state: Mutex::new(HistoryState {
                entries: BTreeMap::new(),
                last_numeric: i64::MIN,
            }),
        }
    }

    /// Retain `rows` under the next order key, evicting the smallest key when
    /// full.
    pub fn push(&self, rows: Vec<R>) -> Result<OrderKey, HistoryError> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let key = match self.key_kind {
            HistoryKeyKind::Numeric => {
                let stamp = now.max(state.last_numeric.saturating_add(1));
                state.last_numeric = stamp;
                OrderKey::Numeric(stamp)
            },
            HistoryKeyKind::LexicalTimestamp => {
                let key = OrderKey::Lexical(lexical_stamp(now).into_boxed_str());
                if state.entries.contains_key(&key) {
                    return Err(HistoryError::KeyCollision {
                        key: key.to_string().into_boxed_str(),
                    });
                }
                key
            },
        };

        if state.entries.len() >= self.capacity.get() {
            state.entries.pop_first();
        }
        state.entries.insert(key.clone(), rows);
        Ok(key)
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained order keys, ascending.
    pub fn keys(&self) -> Vec<OrderKey> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .keys()
            .cloned()
            .collect()
    }

    /// All retained rows in key order, each tagged with its snapshot key.
    pub fn render(&self) -> Vec<HistoryRow<R>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .entries
            .iter()
            .flat_map(|(key, rows)| {
                rows.iter().map(|row| HistoryRow {
                    order_key: key.clone(),
                    row: row.clone(),
                })
            })
            .collect()
    }

    /// Capacity the buffer was built with.
    #[must_use]
    pub const fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }
}

impl<R> fmt::Debug for HistoryBuffer<R> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HistoryBuffer")
            .field("capacity", &self.capacity)
            .field("key_kind", &self.key_kind)
            .finish_non_exhaustive()
    }
}

/// `h:mm:ss AM` of the UTC time-of-day of `epoch_millis`.
fn lexical_stamp(epoch_millis: i64) -> String {
    let seconds_of_day = epoch_millis.div_euclid(1_000).rem_euclid(86_400);
    let hour = seconds_of_day / 3_600;
    let minute = (seconds_of_day % 3_600) / 60;
    let second = seconds_of_day % 60;
    let meridiem = if hour < 12 { "AM" } else { "PM" };
    let hour12 = match hour % 12 {
        0 => 12,
        other => other,
    };
    format!("{hour12}:{minute:02}:{second:02} {meridiem}")
}

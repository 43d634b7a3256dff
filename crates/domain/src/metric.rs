//! Metric kinds shared by the engine and sink adapters.

use crate::keys::MetricKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of the values handed to a metric sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    /// `[elapsed_millis, cpu_nanos]`.
    ElapsedCpu,
    /// `[count]`, replaces the previous count.
    Counter,
    /// `[delta]`, added to the previous count.
    CounterDelta,
    /// `[level]`, point-in-time reading.
    Gauge,
}

impl MetricKind {
    /// Stable identifier used on the wire and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ElapsedCpu => "elapsedCpu",
            Self::Counter => "counter",
            Self::CounterDelta => "counterDelta",
            Self::Gauge => "gauge",
        }
    }

    /// Number of values a well-formed emission carries.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::ElapsedCpu => 2,
            Self::Counter | Self::CounterDelta | Self::Gauge => 1,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Aggregation family of a windowed metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricFamily {
    /// Halving average with low/high, reset after the window.
    Average,
    /// Latest value, zero once stale.
    Point,
    /// Cumulative value, never reset.
    Counter,
}

impl MetricFamily {
    /// Stable identifier matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Average => "average",
            Self::Point => "point",
            Self::Counter => "counter",
        }
    }
}

/// Snapshot of one registered metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricReading {
    /// Metric name.
    pub name: MetricKey,
    /// Aggregation family.
    pub family: MetricFamily,
    /// Current value (average, point value, or cumulative count).
    pub value: i64,
    /// Lowest reading in the window (average family only).
    pub low: i64,
    /// Highest reading in the window (average family only).
    pub high: i64,
    /// Readings merged since the last reset.
    pub count: u64,
}

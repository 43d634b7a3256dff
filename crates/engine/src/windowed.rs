//! Time-windowed statistics.
//!
//! Three families share the same contract: `update_value` is the only mutator,
//! and reads lazily reset windowed state once `now - last_update >= window`.
//!
//! - [`AverageMetric`]: halving average with low/high. The merge is
//!   `(average + v) / 2`, which weights recent readings far more than a mean.
//! - [`PointMetric`]: latest value, 0 once stale.
//! - [`CounterMetric`]: cumulative value, never windowed.
//!
//! Read-modify-write sequences use independent atomics and are not
//! linearizable; concurrent updates may interleave their average merges.

use callmeter_domain::{MetricFamily, MetricKey, MetricReading};
use callmeter_ports::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Window shared by every metric of a registry.
#[derive(Clone)]
pub struct MetricWindow {
    clock: Arc<dyn Clock>,
    window_ms: i64,
}

impl MetricWindow {
    /// Window of `window_ms` measured with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, window_ms: u64) -> Self {
        Self {
            clock,
            window_ms: i64::try_from(window_ms).unwrap_or(i64::MAX),
        }
    }

    /// Window length in milliseconds.
    #[must_use]
    pub const fn window_ms(&self) -> i64 {
        self.window_ms
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    const fn expired(&self, now: i64, last_update: i64) -> bool {
        now.saturating_sub(last_update) >= self.window_ms
    }
}

impl std::fmt::Debug for MetricWindow {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MetricWindow")
            .field("window_ms", &self.window_ms)
            .finish_non_exhaustive()
    }
}

/// Halving average with low and high watermarks.
#[derive(Debug)]
pub struct AverageMetric {
    name: MetricKey,
    window: MetricWindow,
    reading_count: AtomicU64,
    average: AtomicI64,
    low: AtomicI64,
    high: AtomicI64,
    last_update_millis: AtomicI64,
}

impl AverageMetric {
    /// Create an empty metric.
    #[must_use]
    pub const fn new(name: MetricKey, window: MetricWindow) -> Self {
        Self {
            name,
            window,
            reading_count: AtomicU64::new(0),
            average: AtomicI64::new(0),
            low: AtomicI64::new(0),
            high: AtomicI64::new(0),
            last_update_millis: AtomicI64::new(0),
        }
    }

    /// Metric name.
    #[must_use]
    pub const fn name(&self) -> &MetricKey {
        &self.name
    }

    /// Merge one reading.
    ///
    /// An update arriving after the window expired starts a fresh window, so
    /// it seeds average/low/high instead of merging with stale values.
    pub fn update_value(&self, value: i64) {
        let now = self.window.now();
        self.expire_if_stale(now);

        let previous = self.reading_count.fetch_add(1, Ordering::AcqRel);
        if previous == 0 {
            self.average.store(value, Ordering::Release);
            self.low.store(value, Ordering::Release);
            self.high.store(value, Ordering::Release);
        } else {
            let average = self.average.load(Ordering::Acquire);
            self.average
                .store(halving_merge(average, value), Ordering::Release);
            self.low.fetch_min(value, Ordering::AcqRel);
            self.high.fetch_max(value, Ordering::AcqRel);
        }
        self.last_update_millis.store(now, Ordering::Release);
    }

    /// Current average, 0 once the window expired.
    pub fn value(&self) -> i64 {
        self.read(&self.average)
    }

    /// Lowest reading in the window.
    pub fn low(&self) -> i64 {
        self.read(&self.low)
    }

    /// Highest reading in the window.
    pub fn high(&self) -> i64 {
        self.read(&self.high)
    }

    /// Readings merged since the last reset.
    pub fn reading_count(&self) -> u64 {
        self.expire_if_stale(self.window.now());
        self.reading_count.load(Ordering::Acquire)
    }

    /// Snapshot for the registry table.
    pub fn reading(&self) -> MetricReading {
        self.expire_if_stale(self.window.now());
        MetricReading {
            name: self.name.clone(),
            family: MetricFamily::Average,
            value: self.average.load(Ordering::Acquire),
            low: self.low.load(Ordering::Acquire),
            high: self.high.load(Ordering::Acquire),
            count: self.reading_count.load(Ordering::Acquire),
        }
    }

    fn read(&self, slot: &AtomicI64) -> i64 {
        if self.expire_if_stale(self.window.now()) {
            return 0;
        }
        slot.load(Ordering::Acquire)
    }

    fn expire_if_stale(&self, now: i64) -> bool {
        let last_update = self.last_update_millis.load(Ordering::Acquire);
        if !self.window.expired(now, last_update) {
            return false;
        }
        self.reading_count.store(0, Ordering::Release);
        self.average.store(0, Ordering::Release);
        self.low.store(0, Ordering::Release);
        self.high.store(0, Ordering::Release);
        true
    }
}

fn halving_merge(average: i64, value: i64) -> i64 {
    let merged = (i128::from(average) + i128::from(value)) / 2;
    i64::try_from(merged).unwrap_or(average)
}

/// Latest reading, valid for one window.
#[derive(Debug)]
pub struct PointMetric {
    name: MetricKey,
    window: MetricWindow,
    raw_value: AtomicI64,
    last_update_millis: AtomicI64,
}

impl PointMetric {
    /// Create an empty metric.
    #[must_use]
    pub const fn new(name: MetricKey, window: MetricWindow) -> Self {
        Self {
            name,
            window,
            raw_value: AtomicI64::new(0),
            last_update_millis: AtomicI64::new(0),
        }
    }

    /// Metric name.
    #[must_use]
    pub const fn name(&self) -> &MetricKey {
        &self.name
    }

    /// Replace the stored value.
    pub fn update_value(&self, value: i64) {
        self.raw_value.store(value, Ordering::Release);
        self.last_update_millis
            .store(self.window.now(), Ordering::Release);
    }

    /// Latest value, 0 once stale.
    pub fn value(&self) -> i64 {
        let last_update = self.last_update_millis.load(Ordering::Acquire);
        if self.window.expired(self.window.now(), last_update) {
            self.raw_value.store(0, Ordering::Release);
            return 0;
        }
        self.raw_value.load(Ordering::Acquire)
    }

    /// Snapshot for the registry table.
    pub fn reading(&self) -> MetricReading {
        let value = self.value();
        MetricReading {
            name: self.name.clone(),
            family: MetricFamily::Point,
            value,
            low: value,
            high: value,
            count: u64::from(value != 0),
        }
    }
}

/// Cumulative counter. Never reset by the window.
#[derive(Debug)]
pub struct CounterMetric {
    name: MetricKey,
    cumulative_value: AtomicI64,
    updates: AtomicU64,
}

impl CounterMetric {
    /// Create a counter at zero.
    #[must_use]
    pub const fn new(name: MetricKey) -> Self {
        Self {
            name,
            cumulative_value: AtomicI64::new(0),
            updates: AtomicU64::new(0),
        }
    }

    /// Metric name.
    #[must_use]
    pub const fn name(&self) -> &MetricKey {
        &self.name
    }

    /// Add `delta`.
    pub fn update_value(&self, delta: i64) {
        self.cumulative_value.fetch_add(delta, Ordering::AcqRel);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Replace the cumulative value.
    pub fn set_value(&self, value: i64) {
        self.cumulative_value.store(value, Ordering::Release);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative value.
    pub fn value(&self) -> i64 {
        self.cumulative_value.load(Ordering::Acquire)
    }

    /// Snapshot for the registry table.
    pub fn reading(&self) -> MetricReading {
        let value = self.value();
        MetricReading {
            name: self.name.clone(),
            family: MetricFamily::Counter,
            value,
            low: value,
            high: value,
            count: self.updates.load(Ordering::Relaxed),
        }
    }
}

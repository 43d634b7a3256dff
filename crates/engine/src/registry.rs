//! Name-keyed registry of windowed metrics.
//!
//! Metrics are created on first use and live as long as the registry. The
//! `readings` table is the only exposure surface: one row per registered
//! metric, sorted by name then family.

use crate::windowed::{AverageMetric, CounterMetric, MetricWindow, PointMetric};
use callmeter_domain::{MetricFamily, MetricKey, MetricReading};
use callmeter_ports::Clock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared registry of metrics, one map per family.
#[derive(Debug)]
pub struct MetricRegistry {
    window: MetricWindow,
    averages: RwLock<FxHashMap<MetricKey, Arc<AverageMetric>>>,
    points: RwLock<FxHashMap<MetricKey, Arc<PointMetric>>>,
    counters: RwLock<FxHashMap<MetricKey, Arc<CounterMetric>>>,
}

impl MetricRegistry {
    /// Create an empty registry whose metrics expire after `window_ms`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, window_ms: u64) -> Self {
        Self {
            window: MetricWindow::new(clock, window_ms),
            averages: RwLock::default(),
            points: RwLock::default(),
            counters: RwLock::default(),
        }
    }

    /// Window applied to average and point metrics.
    #[must_use]
    pub const fn window(&self) -> &MetricWindow {
        &self.window
    }

    /// Average metric named `key`, created on first use.
    pub fn average(&self, key: &MetricKey) -> Arc<AverageMetric> {
        get_or_create(&self.averages, key, || {
            AverageMetric::new(key.clone(), self.window.clone())
        })
    }

    /// Point metric named `key`, created on first use.
    pub fn point(&self, key: &MetricKey) -> Arc<PointMetric> {
        get_or_create(&self.points, key, || {
            PointMetric::new(key.clone(), self.window.clone())
        })
    }

    /// Counter named `key`, created on first use.
    pub fn counter(&self, key: &MetricKey) -> Arc<CounterMetric> {
        get_or_create(&self.counters, key, || CounterMetric::new(key.clone()))
    }

    /// Number of registered metrics across all families.
    pub fn len(&self) -> usize {
        read_len(&self.averages) + read_len(&self.points) + read_len(&self.counters)
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every registered metric.
    pub fn readings(&self) -> Vec<MetricReading> {
        let mut rows: Vec<MetricReading> = Vec::with_capacity(self.len());
        rows.extend(snapshot(&self.averages).iter().map(|metric| metric.reading()));
        rows.extend(snapshot(&self.points).iter().map(|metric| metric.reading()));
        rows.extend(snapshot(&self.counters).iter().map(|metric| metric.reading()));
        rows.sort_by(|left, right| {
            left.name
                .cmp(&right.name)
                .then_with(|| family_rank(left).cmp(&family_rank(right)))
        });
        rows
    }

    /// Reading for one name, looking through every family.
    pub fn reading(&self, key: &MetricKey) -> Option<MetricReading> {
        if let Some(metric) = lookup(&self.averages, key) {
            return Some(metric.reading());
        }
        if let Some(metric) = lookup(&self.points, key) {
            return Some(metric.reading());
        }
        lookup(&self.counters, key).map(|metric| metric.reading())
    }
}

const fn family_rank(reading: &MetricReading) -> u8 {
    match reading.family {
        MetricFamily::Average => 0,
        MetricFamily::Point => 1,
        MetricFamily::Counter => 2,
    }
}

fn lookup<T>(map: &RwLock<FxHashMap<MetricKey, Arc<T>>>, key: &MetricKey) -> Option<Arc<T>> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .cloned()
}

fn get_or_create<T>(
    map: &RwLock<FxHashMap<MetricKey, Arc<T>>>,
    key: &MetricKey,
    create: impl FnOnce() -> T,
) -> Arc<T> {
    if let Some(existing) = lookup(map, key) {
        return existing;
    }
    let mut guard = map.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(
        guard
            .entry(key.clone())
            .or_insert_with(|| Arc::new(create())),
    )
}

fn snapshot<T>(map: &RwLock<FxHashMap<MetricKey, Arc<T>>>) -> Vec<Arc<T>> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .values()
        .cloned()
        .collect()
}

fn read_len<T>(map: &RwLock<FxHashMap<MetricKey, Arc<T>>>) -> usize {
    map.read().unwrap_or_else(PoisonError::into_inner).len()
}

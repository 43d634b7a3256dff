//! Memoized two-part string concatenation.
//!
//! Outer map keyed by the left part, inner map keyed by the right part. When
//! an inner map grows past the cap it is cleared entirely; later lookups for
//! that left part recompute.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

type Inner = Arc<RwLock<FxHashMap<Box<str>, Arc<str>>>>;

/// Hit/miss/clear counters of a [`ConcatenationCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that computed and stored the result.
    pub misses: u64,
    /// Inner maps cleared for exceeding the cap.
    pub clears: u64,
}

/// Bounded memo of `left + right`.
#[derive(Debug)]
pub struct ConcatenationCache {
    inner_cap: usize,
    outer: RwLock<FxHashMap<Box<str>, Inner>>,
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
}

impl ConcatenationCache {
    /// Default inner map cap.
    pub const DEFAULT_INNER_CAP: usize = 10_000;

    /// Create a cache whose inner maps are cleared past `inner_cap` entries.
    #[must_use]
    pub fn new(inner_cap: usize) -> Self {
        Self {
            inner_cap: inner_cap.max(1),
            outer: RwLock::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        }
    }

    /// `left + right`, shared across callers while cached.
    pub fn concat(&self, left: &str, right: &str) -> Arc<str> {
        let inner = self.inner_for(left);

        let cached = inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(right)
            .cloned();
        if let Some(hit) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }

        let mut map = inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = map.get(right) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut joined = String::with_capacity(left.len() + right.len());
        joined.push_str(left);
        joined.push_str(right);
        let joined: Arc<str> = Arc::from(joined);

        map.insert(right.into(), Arc::clone(&joined));
        if map.len() > self.inner_cap {
            map.clear();
            self.clears.fetch_add(1, Ordering::Relaxed);
        }
        joined
    }

    /// Counters since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }

    /// Entries currently cached under `left`.
    pub fn inner_len(&self, left: &str) -> usize {
        self.outer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(left)
            .map_or(0, |inner| {
                inner.read().unwrap_or_else(PoisonError::into_inner).len()
            })
    }

    /// Configured inner cap.
    #[must_use]
    pub const fn inner_cap(&self) -> usize {
        self.inner_cap
    }

    fn inner_for(&self, left: &str) -> Inner {
        let existing = self
            .outer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(left)
            .cloned();
        if let Some(inner) = existing {
            return inner;
        }
        let mut outer = self.outer.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(outer.entry(left.into()).or_default())
    }
}

impl Default for ConcatenationCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INNER_CAP)
    }
}

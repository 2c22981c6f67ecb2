//! Compiled-query cache.
//!
//! Entries are keyed by the printed shape of the parameterized expression
//! together with the model identity and the sync/async flag. Each key owns
//! a slot with its own lock, so concurrent callers asking for the same key
//! wait for a single build while other keys proceed independently. Failed
//! builds leave the slot empty and are retried by the next caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use strata_common::utils::error::Result;
use strata_core::expression::Expr;
use strata_core::metadata::Model;
use tracing::debug;

use super::compiler::CompiledQuery;

/// Builds the cache key of a parameterized query shape.
#[must_use]
pub fn cache_key(model: &Model, expr: &Expr, is_async: bool) -> String {
    format!("{}:{}:{expr}", model.identity_hash(), is_async)
}

type Slot<V> = Mutex<Option<Arc<V>>>;

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that ran the builder.
    pub misses: u64,
    /// Number of cached entries.
    pub size: usize,
}

/// A keyed cache of compiled queries.
pub struct CompiledQueryCache<V = CompiledQuery> {
    slots: Mutex<IndexMap<String, Arc<Slot<V>>>>,
    capacity: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> CompiledQueryCache<V> {
    /// Creates a cache; `None` keeps entries forever.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            slots: Mutex::new(IndexMap::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the entry for `key`, building it with `build` on a miss.
    ///
    /// `build` runs at most once per key at a time; concurrent callers for
    /// the same key block until it finishes and then share its result.
    ///
    /// # Errors
    ///
    /// Returns the error of `build`; nothing is cached in that case.
    pub fn get_or_add(&self, key: &str, build: impl FnOnce() -> Result<V>) -> Result<Arc<V>> {
        let slot = self.slot(key);
        let mut entry = slot.lock();
        if let Some(value) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(value));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "Compiling query");
        let value = Arc::new(build()?);
        *entry = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Looks up `key` without building.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let slot = self.slots.lock().get(key).cloned()?;
        slot.lock().clone()
    }

    /// Number of keys holding a compiled entry or a build in progress.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if the cache holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.len(),
        }
    }

    fn slot(&self, key: &str) -> Arc<Slot<V>> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        if let Some(capacity) = self.capacity {
            // Oldest compiled entries go first. Slots that are locked or
            // still empty belong to a build in flight and must stay
            // reachable, so the cache may briefly exceed its capacity.
            while slots.len() >= capacity.max(1) {
                let Some(index) = slots
                    .values()
                    .position(|slot| slot.try_lock().is_some_and(|entry| entry.is_some()))
                else {
                    break;
                };
                slots.shift_remove_index(index);
            }
        }
        let slot = Arc::new(Mutex::new(None));
        slots.insert(key.to_string(), Arc::clone(&slot));
        slot
    }
}

impl<V> Default for CompiledQueryCache<V> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<V> std::fmt::Debug for CompiledQueryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQueryCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use rayon::prelude::*;
    use strata_common::utils::error::Error;

    #[test]
    fn test_hit_after_miss() {
        let cache = CompiledQueryCache::<u32>::default();
        assert_eq!(*cache.get_or_add("a", || Ok(1)).unwrap(), 1);
        assert_eq!(*cache.get_or_add("a", || Ok(2)).unwrap(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn test_failed_build_is_retried() {
        let cache = CompiledQueryCache::<u32>::default();
        let err = cache
            .get_or_add("a", || Err(Error::UnsupportedShape("nope".to_string())))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedShape(_)));
        assert!(cache.get("a").is_none());
        assert_eq!(*cache.get_or_add("a", || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = CompiledQueryCache::<u32>::new(Some(2));
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            cache.get_or_add(key, || Ok(u32::try_from(i).unwrap())).unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c").as_deref(), Some(&2));
    }

    #[test]
    fn test_eviction_keeps_in_flight_build() {
        let cache = CompiledQueryCache::<u32>::new(Some(1));
        let builds = AtomicUsize::new(0);
        let value = cache
            .get_or_add("k", || {
                builds.fetch_add(1, Ordering::SeqCst);
                // A different key arrives while "k" is still compiling.
                assert_eq!(*cache.get_or_add("j", || Ok(2)).unwrap(), 2);
                Ok(1)
            })
            .unwrap();
        assert_eq!(*value, 1);
        assert_eq!(*cache.get_or_add("k", || Ok(99)).unwrap(), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_overlapping_builds_under_capacity() {
        let cache = CompiledQueryCache::<usize>::new(Some(1));
        let active: Vec<AtomicUsize> = (0..4).map(|_| AtomicUsize::new(0)).collect();
        let overlaps = AtomicUsize::new(0);
        (0..256).into_par_iter().for_each(|i| {
            let key = i % 4;
            let value = cache
                .get_or_add(&key.to_string(), || {
                    if active[key].fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(std::time::Duration::from_millis(2));
                    active[key].fetch_sub(1, Ordering::SeqCst);
                    Ok(key)
                })
                .unwrap();
            assert_eq!(*value, key);
        });
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_builds_run_once() {
        let cache = CompiledQueryCache::<usize>::default();
        let builds = AtomicUsize::new(0);
        let results: Vec<usize> = (0..64)
            .into_par_iter()
            .map(|_| {
                *cache
                    .get_or_add("shared", || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        Ok(42)
                    })
                    .unwrap()
            })
            .collect();
        assert!(results.iter().all(|&r| r == 42));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_key_includes_async_flag() {
        let model = Model::builder().build().unwrap();
        let expr = Expr::constant(1);
        assert_ne!(cache_key(&model, &expr, false), cache_key(&model, &expr, true));
    }

    #[test]
    fn test_key_separates_constants() {
        use strata_common::types::{Value, ValueType};

        let model = Model::builder().build().unwrap();
        let key = |constant: Expr| {
            let expr = Expr::parameter("x", ValueType::Object).eq(constant);
            cache_key(&model, &expr, false)
        };
        let pairs = [
            (
                Expr::constant(Value::Bytes(vec![0x01, 0x02])),
                Expr::constant(Value::Bytes(vec![0xaa, 0xbb])),
            ),
            (Expr::constant(2), Expr::constant(2.0)),
            (Expr::constant("O'Brien"), Expr::constant("O\"Brien")),
            (Expr::null(ValueType::Int32), Expr::null(ValueType::Int64)),
            (Expr::constant(1.0), Expr::constant(1.0 + f64::EPSILON)),
        ];
        for (a, b) in pairs {
            assert_ne!(key(a.clone()), key(b.clone()), "{a} vs {b}");
        }
        assert_eq!(key(Expr::constant(2.0)), key(Expr::constant(2.0)));
    }
}

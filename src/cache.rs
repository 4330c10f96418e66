//! Sharded Concurrent Cache
//!
//! A fixed-bucket-count hash table with one lock per bucket. This is
//! the memoization layer consulted on every execution-authorization
//! request, keyed by binary/process identity.
//!
//! Behavior:
//! - Bucket count is `max_size / per_bucket` rounded up to a power of two
//! - Locking is per-bucket; `foreach` and `clear` take every bucket lock in
//!   ascending index order
//! - The value type's `Default` is the "zero" value and means "absent"
//! - Inserting past `max_size` flushes the whole table, then inserts
//!
//! The flush-on-overflow policy is not LRU. Callers get an amortizing
//! bounded cache, and `clear_with` visitors see every entry at once.

use crossbeam::utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::config::CacheConfig;

/// Default maximum number of entries
pub const DEFAULT_MAX_SIZE: u64 = 10_000;

/// Default target entries per bucket when the cache is full
pub const DEFAULT_PER_BUCKET: u8 = 5;

const MAX_PER_BUCKET: u8 = 64;

// Largest power of two that fits in a u32.
const MAX_BUCKET_COUNT: u64 = 1 << 31;

struct Entry<K, V> {
    key: K,
    value: V,
}

type Bucket<K, V> = CachePadded<Mutex<Vec<Entry<K, V>>>>;
type BucketGuard<'a, K, V> = MutexGuard<'a, Vec<Entry<K, V>>>;

/// Concurrent, bounded, sharded hash cache
pub struct SantaCache<K, V, S = RandomState> {
    buckets: Box<[Bucket<K, V>]>,

    /// Entry cap; inserting beyond it flushes the table
    max_size: u64,

    /// Live entries
    count: AtomicU64,

    /// Serializes overflow-triggered flushes
    clear_lock: Mutex<()>,

    /// Statistics
    overflow_clears: AtomicU64,

    hasher: S,
}

/// Compute the bucket count for a given size and per-bucket target.
fn bucket_count_for(max_size: u64, per_bucket: u8) -> usize {
    let per_bucket = u64::from(per_bucket)
        .min(max_size)
        .max(1)
        .min(u64::from(MAX_PER_BUCKET));

    let wanted = max_size.div_ceil(per_bucket).max(1);
    let count = wanted
        .checked_next_power_of_two()
        .unwrap_or(MAX_BUCKET_COUNT)
        .min(MAX_BUCKET_COUNT);

    count as usize
}

impl<K, V> SantaCache<K, V, RandomState>
where
    K: Hash + Eq,
    V: Default + PartialEq,
{
    /// Create a new cache
    ///
    /// `per_bucket` is clamped to `[1, 64]` and to `max_size`.
    pub fn new(max_size: u64, per_bucket: u8) -> Self {
        Self::with_hasher(max_size, per_bucket, RandomState::new())
    }

    /// Create a cache sized from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.per_bucket)
    }
}

impl<K, V> Default for SantaCache<K, V, RandomState>
where
    K: Hash + Eq,
    V: Default + PartialEq,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_PER_BUCKET)
    }
}

impl<K, V, S> SantaCache<K, V, S>
where
    K: Hash + Eq,
    V: Default + PartialEq,
    S: BuildHasher,
{
    /// Create a new cache with a custom hasher
    pub fn with_hasher(max_size: u64, per_bucket: u8, hasher: S) -> Self {
        let bucket_count = bucket_count_for(max_size, per_bucket);
        let buckets = (0..bucket_count)
            .map(|_| CachePadded::new(Mutex::new(Vec::new())))
            .collect();

        Self {
            buckets,
            max_size,
            count: AtomicU64::new(0),
            clear_lock: Mutex::new(()),
            overflow_clears: AtomicU64::new(0),
            hasher,
        }
    }

    fn bucket<Q>(&self, key: &Q) -> &Bucket<K, V>
    where
        Q: Hash + ?Sized,
    {
        let index = self.hasher.hash_one(key) % self.buckets.len() as u64;
        &self.buckets[index as usize]
    }

    /// Get a value. Returns the zero value if the key is absent.
    pub fn get<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let entries = self.bucket(key).lock();
        entries
            .iter()
            .find(|e| e.key.borrow() == key)
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }

    /// Set a value. Setting the zero value removes the key.
    ///
    /// Returns false only when removing a key that isn't present.
    pub fn set(&self, key: K, value: V) -> bool {
        self.store(key, value, None)
    }

    /// Set a value only if the stored value equals `previous`.
    ///
    /// An absent key compares equal to the zero value.
    pub fn compare_and_set(&self, key: K, value: V, previous: V) -> bool {
        self.store(key, value, Some(previous))
    }

    /// Update a value in place under the bucket lock.
    ///
    /// An absent key is presented to `mutator` as the zero value. If the
    /// mutator leaves the zero value behind, the entry is removed.
    /// `mutator` must not call back into this cache.
    pub fn update<F>(&self, key: K, mutator: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        let zero = V::default();
        let bucket = self.bucket(&key);
        let mut flushed = false;

        loop {
            let mut entries = bucket.lock();

            if let Some(pos) = entries.iter().position(|e| e.key == key) {
                mutator(&mut entries[pos].value);
                if entries[pos].value == zero {
                    entries.swap_remove(pos);
                    self.count.fetch_sub(1, Ordering::AcqRel);
                }
                return true;
            }

            if !self.reserve_slot(flushed) {
                drop(entries);
                self.flush_for_insert();
                flushed = true;
                continue;
            }

            // Handed back if the mutator leaves zero or unwinds.
            let slot = SlotReservation { count: &self.count };
            let mut value = V::default();
            mutator(&mut value);
            if value != zero {
                entries.push(Entry { key, value });
                slot.commit();
            }
            return true;
        }
    }

    /// Remove a key. Returns false if it wasn't present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.bucket(key).lock();
        match entries.iter().position(|e| e.key.borrow() == key) {
            Some(pos) => {
                entries.swap_remove(pos);
                self.count.fetch_sub(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// Check whether a key is present
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.contains_with(key, |_| true)
    }

    /// Check a key's value with `predicate` while holding the bucket lock.
    ///
    /// Returns false if the key is absent, otherwise the predicate's result.
    pub fn contains_with<Q, F>(&self, key: &Q, predicate: F) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> bool,
    {
        let entries = self.bucket(key).lock();
        entries
            .iter()
            .find(|e| e.key.borrow() == key)
            .is_some_and(|e| predicate(&e.value))
    }

    /// Visit every entry while holding every bucket lock.
    ///
    /// Blocks all other cache operations for the duration.
    pub fn foreach<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        let guards = self.lock_all();
        for entries in &guards {
            for entry in entries.iter() {
                visitor(&entry.key, &entry.value);
            }
        }
    }

    /// Remove all entries
    pub fn clear(&self) {
        trace!("clearing cache");
        self.clear_with(|_, _| {});
    }

    /// Remove all entries, handing each one to `visitor` before it is dropped.
    ///
    /// `visitor` must not call back into this cache.
    pub fn clear_with<F>(&self, mut visitor: F)
    where
        F: FnMut(K, V),
    {
        let mut guards = self.lock_all();
        for entries in guards.iter_mut() {
            for entry in std::mem::take(&mut **entries) {
                visitor(entry.key, entry.value);
            }
        }
        // All bucket locks are held, so no insert can race this store.
        self.count.store(0, Ordering::Release);
    }

    /// Number of entries currently in the cache
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Maximum number of entries before the cache is flushed
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Fill `per_bucket_counts` with live-entry counts, starting at
    /// `*start_bucket`.
    ///
    /// Returns the number of slots filled. On return `*start_bucket` holds
    /// the next bucket to visit, or 0 once every bucket has been visited.
    pub fn bucket_counts(&self, per_bucket_counts: &mut [u16], start_bucket: &mut u64) -> usize {
        let bucket_count = self.buckets.len() as u64;
        let start = *start_bucket;
        if start >= bucket_count {
            *start_bucket = 0;
            return 0;
        }

        let size = (per_bucket_counts.len() as u64).min(bucket_count - start) as usize;
        for (i, slot) in per_bucket_counts[..size].iter_mut().enumerate() {
            let entries = self.buckets[start as usize + i].lock();
            *slot = u16::try_from(entries.len()).unwrap_or(u16::MAX);
        }

        let next = start + size as u64;
        *start_bucket = if next >= bucket_count { 0 } else { next };
        size
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.count(),
            max_size: self.max_size,
            bucket_count: self.buckets.len(),
            overflow_clears: self.overflow_clears.load(Ordering::Relaxed),
        }
    }

    fn store(&self, key: K, value: V, previous: Option<V>) -> bool {
        let zero = V::default();
        let bucket = self.bucket(&key);
        let mut flushed = false;

        loop {
            let mut entries = bucket.lock();

            if let Some(pos) = entries.iter().position(|e| e.key == key) {
                if previous.as_ref().is_some_and(|p| *p != entries[pos].value) {
                    return false;
                }
                if value == zero {
                    entries.swap_remove(pos);
                    self.count.fetch_sub(1, Ordering::AcqRel);
                } else {
                    entries[pos].value = value;
                }
                return true;
            }

            // Removing a missing key, or CAS against a non-zero value that
            // isn't there.
            if value == zero || previous.as_ref().is_some_and(|p| *p != zero) {
                return false;
            }

            if !self.reserve_slot(flushed) {
                drop(entries);
                self.flush_for_insert();
                flushed = true;
                continue;
            }

            entries.push(Entry { key, value });
            return true;
        }
    }

    /// Claim room for one new entry. Must be called with the target bucket
    /// locked. A zero-sized cache still admits one entry after a flush.
    fn reserve_slot(&self, flushed: bool) -> bool {
        if flushed && self.max_size == 0 {
            self.count.fetch_add(1, Ordering::AcqRel);
            return true;
        }
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.max_size).then_some(count + 1)
            })
            .is_ok()
    }

    /// Flush the table on behalf of an insert that found it full. The caller
    /// must not hold any bucket lock.
    fn flush_for_insert(&self) {
        let _coordinator = self.clear_lock.lock();
        // Another thread may have flushed while we waited.
        let count = self.count();
        if count >= self.max_size {
            debug!(entries = count, max_size = self.max_size, "cache full, flushing all entries");
            self.clear_with(|_, _| {});
            self.overflow_clears.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Lock every bucket in ascending index order. Guards release in the
    /// same order when the returned vector is dropped.
    fn lock_all(&self) -> Vec<BucketGuard<'_, K, V>> {
        self.buckets.iter().map(|bucket| bucket.lock()).collect()
    }
}

/// A claimed slot in `count` that is returned on drop unless committed.
struct SlotReservation<'a> {
    count: &'a AtomicU64,
}

impl SlotReservation<'_> {
    fn commit(self) {
        std::mem::forget(self);
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub max_size: u64,
    pub bucket_count: usize,
    pub overflow_clears: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;
    use std::panic::AssertUnwindSafe;

    fn per_bucket_distribution<K, V>(cache: &SantaCache<K, V>) -> (f64, f64)
    where
        K: Hash + Eq,
        V: Default + PartialEq,
    {
        let mut counts = vec![0u16; cache.bucket_count()];
        let mut start = 0u64;
        let filled = cache.bucket_counts(&mut counts, &mut start);
        assert_eq!(filled, cache.bucket_count());
        assert_eq!(start, 0);

        let n = counts.len() as f64;
        let mean = counts.iter().map(|&c| f64::from(c)).sum::<f64>() / n;
        let variance = counts
            .iter()
            .map(|&c| (f64::from(c) - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, variance.sqrt())
    }

    #[test]
    fn test_cache_set_get() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        assert!(cache.set(1, 42));
        assert_eq!(cache.get(&1), 42);
        assert_eq!(cache.count(), 1);

        assert!(cache.set(1, 43));
        assert_eq!(cache.get(&1), 43);
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn test_cache_miss_returns_zero() {
        let cache: SantaCache<u64, u64> = SantaCache::default();
        assert_eq!(cache.get(&7), 0);
        assert!(!cache.contains(&7));
    }

    #[test]
    fn test_cache_borrowed_lookup() {
        let cache: SantaCache<String, u32> = SantaCache::new(100, 5);

        cache.set("sha256:abc".to_string(), 3);
        assert_eq!(cache.get("sha256:abc"), 3);
        assert!(cache.contains("sha256:abc"));
        assert!(cache.remove("sha256:abc"));
        assert!(!cache.contains("sha256:abc"));
    }

    #[test]
    fn test_cache_remove_round_trip() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        for k in 1..50u64 {
            cache.set(k, k * 10);
            assert!(cache.remove(&k));
            assert_eq!(cache.get(&k), 0);
            assert!(!cache.contains(&k));
        }
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_cache_set_zero_removes() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        cache.set(5, 1);
        assert!(cache.set(5, 0));
        assert!(!cache.contains(&5));
        assert_eq!(cache.count(), 0);

        // Deleting a missing key is a no-op
        assert!(!cache.set(5, 0));
        assert!(!cache.remove(&5));
    }

    #[test]
    fn test_cache_compare_and_set() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        cache.set(1, 100);
        assert!(cache.compare_and_set(1, 200, 100));
        assert_eq!(cache.get(&1), 200);

        assert!(!cache.compare_and_set(1, 300, 999));
        assert_eq!(cache.get(&1), 200);
    }

    #[test]
    fn test_cache_compare_and_set_absent_key() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        // Absent compares equal to zero
        assert!(!cache.compare_and_set(1, 10, 5));
        assert!(!cache.contains(&1));

        assert!(cache.compare_and_set(1, 10, 0));
        assert_eq!(cache.get(&1), 10);

        // CAS to zero removes
        assert!(cache.compare_and_set(1, 0, 10));
        assert!(!cache.contains(&1));
    }

    #[test]
    fn test_cache_update() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        assert!(cache.update(1, |v| *v += 1));
        assert!(cache.update(1, |v| *v += 1));
        assert_eq!(cache.get(&1), 2);
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn test_cache_update_to_zero_removes() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        cache.set(1, 5);
        cache.update(1, |v| *v = 0);
        assert!(!cache.contains(&1));
        assert_eq!(cache.count(), 0);

        // A mutator that leaves a new key at zero never creates an entry
        cache.update(2, |_| {});
        assert!(!cache.contains(&2));
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_cache_update_nested_collection() {
        let cache: SantaCache<u64, Vec<String>> = SantaCache::default();

        cache.update(1, |v| v.push("a".to_string()));
        cache.update(1, |v| v.push("b".to_string()));
        assert_eq!(cache.get(&1), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_cache_update_panicking_mutator_leaves_no_trace() {
        let cache: SantaCache<u64, u64> = SantaCache::new(10, 5);
        cache.set(2, 20);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            cache.update(1, |_| panic!("mutator failed"));
        }));
        assert!(result.is_err());

        let mut live = 0u64;
        cache.foreach(|_, _| live += 1);
        assert_eq!(live, 1);
        assert_eq!(cache.count(), 1);
        assert!(!cache.contains(&1));

        // The bucket lock was released and the slot returned
        assert!(cache.update(1, |v| *v = 7));
        assert_eq!(cache.get(&1), 7);
        assert_eq!(cache.count(), 2);
    }

    #[test]
    fn test_cache_overflow_does_not_exceed_max_size() {
        let cache: SantaCache<u64, u64> = SantaCache::new(10, 5);

        for k in 1..=35u64 {
            cache.set(k, k);
            assert!(cache.count() <= cache.max_size());
        }
        assert_eq!(cache.count(), 5);
        assert_eq!(cache.stats().overflow_clears, 3);
    }

    #[test]
    fn test_cache_contains_with() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        cache.set(1, 10);
        assert!(cache.contains_with(&1, |v| *v == 10));
        assert!(!cache.contains_with(&1, |v| *v == 11));
        assert!(!cache.contains_with(&2, |_| true));
    }

    #[test]
    fn test_cache_overflow_clears() {
        let cache: SantaCache<u64, u64> = SantaCache::new(100, 5);

        for k in 1..=100u64 {
            cache.set(k, k);
        }
        assert_eq!(cache.count(), 100);

        cache.set(101, 101);
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.get(&101), 101);
        assert!(!cache.contains(&1));
        assert_eq!(cache.stats().overflow_clears, 1);
    }

    #[test]
    fn test_cache_overflow_via_update() {
        let cache: SantaCache<u64, u64> = SantaCache::new(10, 5);

        for k in 1..=10u64 {
            cache.update(k, |v| *v = k);
        }
        cache.update(11, |v| *v = 11);
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.get(&11), 11);
    }

    #[test]
    fn test_cache_overwrite_at_capacity_does_not_clear() {
        let cache: SantaCache<u64, u64> = SantaCache::new(10, 5);

        for k in 1..=10u64 {
            cache.set(k, k);
        }
        cache.set(5, 500);
        assert_eq!(cache.count(), 10);
        assert_eq!(cache.get(&5), 500);
    }

    #[test]
    fn test_cache_zero_max_size() {
        let cache: SantaCache<u64, u64> = SantaCache::new(0, 5);
        assert_eq!(cache.bucket_count(), 1);

        assert!(cache.set(1, 1));
        assert!(cache.set(2, 2));
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.get(&2), 2);
    }

    #[test]
    fn test_cache_clear_with_visits_all() {
        let cache: SantaCache<u64, u64> = SantaCache::default();
        for k in 1..=20u64 {
            cache.set(k, k + 1000);
        }

        let mut seen = HashSet::new();
        cache.clear_with(|k, v| {
            assert_eq!(v, k + 1000);
            seen.insert(k);
        });

        assert_eq!(seen.len(), 20);
        assert_eq!(cache.count(), 0);
        assert!(!cache.contains(&1));

        // Usable after clear
        cache.set(1, 1);
        assert_eq!(cache.get(&1), 1);
    }

    #[test]
    fn test_cache_foreach() {
        let cache: SantaCache<u64, u64> = SantaCache::default();
        for k in 1..=50u64 {
            cache.set(k, k);
        }
        cache.remove(&10);

        let mut sum = 0;
        let mut visited = 0;
        cache.foreach(|k, v| {
            assert_eq!(k, v);
            sum += *v;
            visited += 1;
        });

        assert_eq!(visited, 49);
        assert_eq!(sum, (1..=50u64).sum::<u64>() - 10);
    }

    #[test]
    fn test_bucket_count_calculation() {
        assert_eq!(bucket_count_for(10_000, 5), 2048);
        assert_eq!(bucket_count_for(1, 5), 1);
        assert_eq!(bucket_count_for(0, 5), 1);
        assert_eq!(bucket_count_for(100, 0), 128);
        // per_bucket clamps to 64
        assert_eq!(bucket_count_for(100, 200), 2);
        assert_eq!(bucket_count_for(640, 255), 16);
        assert_eq!(bucket_count_for(u64::MAX, 1), 1 << 31);
    }

    #[test]
    fn test_bucket_counts_paging() {
        let cache: SantaCache<u64, u64> = SantaCache::new(64, 8);
        assert_eq!(cache.bucket_count(), 8);

        for k in 1..=20u64 {
            cache.set(k, k);
        }

        let mut start = 0u64;
        let mut total = 0u64;
        let mut pages = 0;
        loop {
            let mut counts = [0u16; 3];
            let filled = cache.bucket_counts(&mut counts, &mut start);
            total += counts[..filled].iter().map(|&c| u64::from(c)).sum::<u64>();
            pages += 1;
            if start == 0 {
                break;
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(total, 20);

        // Out-of-range start resets
        let mut counts = [0u16; 4];
        let mut start = 100;
        assert_eq!(cache.bucket_counts(&mut counts, &mut start), 0);
        assert_eq!(start, 0);
    }

    #[test]
    fn test_cache_distribution_random_keys() {
        let cache: SantaCache<u64, u64> = SantaCache::new(DEFAULT_MAX_SIZE, DEFAULT_PER_BUCKET);
        let mut rng = rand::thread_rng();

        let mut inserted = 0;
        while inserted < 4000 {
            let k: u64 = rng.gen_range(1..u64::MAX);
            if !cache.contains(&k) {
                cache.set(k, 1);
                inserted += 1;
            }
        }

        let (mean, stddev) = per_bucket_distribution(&cache);
        assert!(mean <= 5.0, "mean {mean}");
        assert!(stddev <= 2.5, "stddev {stddev}");
    }

    #[test]
    fn test_cache_distribution_sequential_keys() {
        let cache: SantaCache<u64, u64> = SantaCache::new(DEFAULT_MAX_SIZE, DEFAULT_PER_BUCKET);
        for k in 1..=4000u64 {
            cache.set(k, 1);
        }

        let (mean, stddev) = per_bucket_distribution(&cache);
        assert!(mean <= 5.0, "mean {mean}");
        assert!(stddev <= 2.5, "stddev {stddev}");
    }

    #[test]
    fn test_cache_stats() {
        let cache: SantaCache<u64, u64> = SantaCache::new(100, 5);
        cache.set(1, 1);
        cache.set(2, 2);

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.max_size, 100);
        assert_eq!(stats.bucket_count, 32);
        assert_eq!(stats.overflow_clears, 0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for i in 0..1000u64 {
                        cache.update(i % 16, |v| *v += 1);
                    }
                });
            }
        });

        let mut total = 0;
        cache.foreach(|_, v| total += *v);
        assert_eq!(total, 8000);
        assert_eq!(cache.count(), 16);
    }

    #[test]
    fn test_concurrent_compare_and_set_counter() {
        let cache: SantaCache<u64, u64> = SantaCache::default();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        loop {
                            let current = cache.get(&1);
                            if cache.compare_and_set(1, current + 1, current) {
                                break;
                            }
                        }
                    }
                });
            }
        });

        assert_eq!(cache.get(&1), 2000);
    }

    #[test]
    fn test_concurrent_inserts_respect_bound() {
        let cache: SantaCache<u64, u64> = SantaCache::new(1000, 5);
        let threads = 4u64;

        std::thread::scope(|s| {
            for t in 0..threads {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..5000u64 {
                        cache.set(t * 1_000_000 + i + 1, i + 1);
                    }
                });
            }
        });

        assert!(cache.count() <= cache.max_size());
        assert!(cache.stats().overflow_clears > 0);

        let mut live = 0u64;
        cache.foreach(|_, _| live += 1);
        assert_eq!(live, cache.count());
    }

    #[test]
    fn test_concurrent_foreach_and_clear() {
        let cache: SantaCache<u64, u64> = SantaCache::new(500, 5);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..5000u64 {
                    cache.set(i + 1, 1);
                }
            });
            s.spawn(|| {
                for _ in 0..50 {
                    cache.foreach(|_, v| assert_eq!(*v, 1));
                }
            });
            s.spawn(|| {
                for _ in 0..50 {
                    cache.clear();
                }
            });
        });

        let mut live = 0u64;
        cache.foreach(|_, _| live += 1);
        assert_eq!(live, cache.count());
    }
}

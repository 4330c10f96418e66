//! Bounded Set Cache
//!
//! Maps a key to a bounded set of values on top of [`SantaCache`]. The
//! outer map follows the cache's flush-on-overflow policy; an inner set
//! that would grow past `per_entry_capacity` is emptied before the new
//! value goes in.
//!
//! Sets are copy-on-write, so a [`snapshot`](SantaSetCache::snapshot) never
//! observes later mutations.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::collections::HashSet;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use crate::cache::{SantaCache, DEFAULT_PER_BUCKET};

type SharedSet<V> = Option<Arc<HashSet<V>>>;

pub struct SantaSetCache<K, V, S = RandomState> {
    cache: SantaCache<K, SharedSet<V>, S>,
    per_entry_capacity: usize,
}

impl<K, V> SantaSetCache<K, V, RandomState>
where
    K: Hash + Eq,
    V: Hash + Eq + Clone,
{
    pub fn new(capacity: u64, per_entry_capacity: usize) -> Self {
        Self {
            cache: SantaCache::new(capacity, DEFAULT_PER_BUCKET),
            per_entry_capacity,
        }
    }
}

impl<K, V, S> SantaSetCache<K, V, S>
where
    K: Hash + Eq,
    V: Hash + Eq + Clone,
    S: BuildHasher,
{
    /// Whether the set at `key` contains `val`
    pub fn contains<Q>(&self, key: &Q, val: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache
            .contains_with(key, |set| set.as_ref().is_some_and(|s| s.contains(val)))
    }

    /// Add `val` to the set at `key`, creating the set if needed.
    ///
    /// Returns false if the value was already present.
    pub fn set(&self, key: K, val: V) -> bool {
        let mut did_set = false;
        let per_entry_capacity = self.per_entry_capacity;

        self.cache.update(key, |slot| {
            let set = Arc::make_mut(slot.get_or_insert_with(Default::default));
            if set.contains(&val) {
                return;
            }
            if set.len() >= per_entry_capacity {
                set.clear();
            }
            set.insert(val);
            did_set = true;
        });

        did_set
    }

    /// Drop the whole set at `key`
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.remove(key)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of keys
    pub fn len(&self) -> u64 {
        self.cache.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the set at `key`, 0 if absent
    pub fn set_len<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.snapshot(key).map_or(0, |set| set.len())
    }

    /// Immutable view of the set at `key`
    pub fn snapshot<Q>(&self, key: &Q) -> Option<Arc<HashSet<V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.cache.get(key)
    }
}

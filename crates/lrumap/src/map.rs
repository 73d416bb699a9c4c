//! LruMap: thread-safe bounded LRU map

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::RandomState;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, trace};

use crate::error::Result;
use crate::lru::LruCache;
use crate::stats::CacheStats;

/// Bounded LRU map that can be shared between threads
///
/// One reader/writer lock guards the key index and the recency order
/// together. Lookups that refresh recency (`get`) take the write lock;
/// pure inspection (`len`, `contains_key`, `peek`, snapshots) takes the
/// read lock.
///
/// `keys`, `values` and `entries` return owned snapshots ordered from least
/// to most recently used. They never observe later mutations.
///
/// If a panic unwinds out of an exclusive section (for example from a
/// user `Hash` impl), the map is marked corrupted and every later call
/// panics rather than run on a half-updated recency list.
pub struct LruMap<K, V> {
    /// Key index plus recency list
    inner: RwLock<LruCache<K, V>>,

    /// Hit/miss and churn counters
    stats: CacheStats,

    /// Set when a write section unwound
    corrupted: AtomicBool,
}

/// Write guard that marks the map corrupted if a panic starts while it is held
struct WriteGuard<'a, K, V> {
    guard: RwLockWriteGuard<'a, LruCache<K, V>>,
    corrupted: &'a AtomicBool,
    /// Thread was already unwinding when the lock was taken
    panicking_on_entry: bool,
}

impl<K, V> Deref for WriteGuard<'_, K, V> {
    type Target = LruCache<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<K, V> DerefMut for WriteGuard<'_, K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<K, V> Drop for WriteGuard<'_, K, V> {
    fn drop(&mut self) {
        // Runs before the lock guard field is released. A write made from a
        // destructor during an unrelated unwind completed normally.
        if !self.panicking_on_entry && std::thread::panicking() {
            self.corrupted.store(true, Ordering::Release);
            error!("panic while holding the LRU map write lock; map is now unusable");
        }
    }
}

impl<K, V> LruMap<K, V> {
    /// Get the fixed capacity
    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Remove every entry and reset statistics
    pub fn clear(&self) {
        let cleared = {
            let mut cache = self.write();
            let len = cache.len();
            cache.clear();
            len
        };
        self.stats.reset();
        trace!(entries = cleared, "cleared LRU map");
    }

    fn ensure_intact(&self) {
        if self.corrupted.load(Ordering::Acquire) {
            panic!("LruMap is unusable: an earlier operation panicked while holding the write lock");
        }
    }

    // The flag is checked while holding the lock, so a thread queued behind
    // a writer that panics still sees it.
    fn read(&self) -> RwLockReadGuard<'_, LruCache<K, V>> {
        let guard = self.inner.read();
        self.ensure_intact();
        guard
    }

    fn write(&self) -> WriteGuard<'_, K, V> {
        let guard = self.inner.write();
        self.ensure_intact();
        WriteGuard {
            guard,
            corrupted: &self.corrupted,
            panicking_on_entry: std::thread::panicking(),
        }
    }
}

impl<K, V> LruMap<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new map holding at most `capacity` entries
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of live entries, must be positive
    ///
    /// # Returns
    /// * `Result<LruMap>` - `Error::InvalidConfiguration` if `capacity` is 0
    pub fn new(capacity: usize) -> Result<Self> {
        let cache = LruCache::new(capacity)?;
        debug!(capacity, "created LRU map");

        Ok(Self {
            inner: RwLock::new(cache),
            stats: CacheStats::new(),
            corrupted: AtomicBool::new(false),
        })
    }

    /// Check whether `key` is live
    ///
    /// Containment checks do not refresh recency.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.read().contains_key(key)
    }

    /// Check whether any live entry holds `value`
    ///
    /// Scans every entry under the read lock; recency is unchanged.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.read().contains_value(value)
    }

    /// Get a copy of the value for `key`, marking it most recently used
    ///
    /// # Arguments
    /// * `key` - Key to look up
    ///
    /// # Returns
    /// * `Option<V>` - Cloned value, or `None` if the key is not live
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let value = self.write().get(key).cloned();

        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    /// Get a copy of the value for `key` without refreshing recency
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.read().peek(key).cloned()
    }

    /// Insert or update an entry
    ///
    /// # Arguments
    /// * `key` - Key to insert
    /// * `value` - New value
    ///
    /// # Returns
    /// * `Option<V>` - Previous value if the key was live
    ///
    /// A fresh key that pushes the map over capacity evicts the least
    /// recently used entry before this call returns.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let (previous, evicted) = self.write().insert(key, value);
        self.record_put(previous.is_some(), evicted.is_some());
        previous
    }

    /// Apply `put` for every entry in order under one write lock
    ///
    /// The input is collected before locking, so the iterator may freely
    /// read this map. Each entry may evict on its own.
    pub fn put_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        let mut evicted = Vec::new();

        {
            let mut cache = self.write();
            for (key, value) in entries {
                let (previous, lru) = cache.insert(key, value);
                self.record_put(previous.is_some(), lru.is_some());
                evicted.extend(lru);
            }
        }

        // Evicted entries are dropped outside the lock
        drop(evicted);
    }

    /// Remove `key`, returning its value if it was live
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.write().remove(key);
        if removed.is_some() {
            self.stats.record_removal();
        }
        removed
    }

    /// Remove and return the least recently used entry
    pub fn pop_lru(&self) -> Option<(K, V)> {
        let popped = self.write().pop_lru();
        if popped.is_some() {
            self.stats.record_removal();
        }
        popped
    }

    /// Snapshot of live keys, least recently used first
    pub fn keys(&self) -> Vec<K> {
        self.read().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Snapshot of live values, least recently used first
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.read().iter().map(|(_, v)| v.clone()).collect()
    }

    /// Snapshot of live entries, least recently used first
    pub fn entries(&self) -> Vec<(K, V)>
    where
        V: Clone,
    {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Verify the key index and recency list agree
    pub fn check_invariants(&self) -> Result<()> {
        let result = self.read().check_invariants();
        if let Err(e) = &result {
            error!(error = %e, "LRU map failed consistency check");
        }
        result
    }

    fn record_put(&self, updated: bool, evicted: bool) {
        if updated {
            self.stats.record_update();
        } else {
            self.stats.record_insert();
        }
        if evicted {
            self.stats.record_eviction();
            trace!("evicted least recently used entry");
        }
    }
}

impl<K, V> PartialEq for LruMap<K, V>
where
    K: Hash + Eq + Clone,
    V: PartialEq + Clone,
{
    /// Maps are equal when they hold the same entries; capacity and
    /// recency order are ignored.
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }

        // Never hold both locks at once
        let ours = self.entries();
        let theirs = other.read();
        ours.len() == theirs.len() && ours.iter().all(|(k, v)| theirs.peek(k) == Some(v))
    }
}

impl<K, V> Eq for LruMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Eq + Clone,
{
}

impl<K, V> Hash for LruMap<K, V>
where
    K: Hash,
    V: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-insensitive so it agrees with `PartialEq`
        let entry_hasher = RandomState::with_seeds(0, 0, 0, 0);
        let cache = self.read();
        let combined = cache
            .iter()
            .fold(0u64, |acc, entry| acc.wrapping_add(entry_hasher.hash_one(entry)));

        state.write_usize(cache.len());
        state.write_u64(combined);
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for LruMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.read();
        f.debug_struct("LruMap")
            .field("capacity", &cache.capacity())
            .field("entries", &*cache)
            .finish()
    }
}

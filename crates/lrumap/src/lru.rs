//! LRU (Least Recently Used) recency store
//!
//! Entries live in a slab of index-linked nodes. `head` is the most recently
//! used entry and `tail` the least, so promotion and eviction are O(1).
//! Freed slots are recycled through a free list.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use ahash::RandomState;

use crate::error::{Error, Result};

/// Upper bound on slots reserved up front, so huge capacities stay lazy
const MAX_PREALLOC: usize = 1 << 16;

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    key: K,
    value: V,
    /// Towards the most recently used end
    prev: Option<usize>,
    /// Towards the least recently used end
    next: Option<usize>,
}

/// Single-threaded LRU cache with fixed capacity
///
/// This is the unsynchronized core behind [`LruMap`](crate::LruMap). It can
/// be used directly when the caller already owns exclusive access.
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    capacity: usize,
}

impl<K, V> LruCache<K, V> {
    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get the fixed capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterate over entries from least to most recently used
    ///
    /// Iteration does not change recency.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            cursor: self.tail,
            remaining: self.map.len(),
        }
    }
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU cache with the given capacity
    ///
    /// Fails with [`Error::InvalidConfiguration`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::zero_capacity());
        }

        let reserve = capacity.min(MAX_PREALLOC);
        Ok(Self {
            map: HashMap::with_capacity_and_hasher(reserve, RandomState::new()),
            nodes: Vec::with_capacity(reserve),
            head: None,
            tail: None,
            free_list: Vec::new(),
            capacity,
        })
    }

    /// Get a value and mark it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Get a value without touching recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Check whether a key is live; recency is unchanged
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Check whether any live entry holds `value` (full scan)
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.iter().any(|(_, v)| v == value)
    }

    /// Insert or update a key, returning the previous value
    ///
    /// A fresh key that pushes the cache over capacity evicts the least
    /// recently used entry.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.insert(key, value).0
    }

    /// Insert or update, reporting both the replaced value and the evicted entry
    pub(crate) fn insert(&mut self, key: K, value: V) -> (Option<V>, Option<(K, V)>) {
        if let Some(&idx) = self.map.get(&key) {
            let previous = self.nodes[idx]
                .as_mut()
                .map(|node| std::mem::replace(&mut node.value, value));
            self.move_to_front(idx);
            return (previous, None);
        }

        let stored = key.clone();
        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: stored,
            value,
            prev: None,
            next: None,
        });
        self.link_front(idx);
        self.map.insert(key, idx);

        // The new key sits at the head, so it is never the one evicted
        let evicted = if self.map.len() > self.capacity {
            self.pop_lru()
        } else {
            None
        };
        (None, evicted)
    }

    /// Remove a key from the cache
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free_node(idx);
        self.nodes[idx].take().map(|node| node.value)
    }

    /// Remove and return the least recently used entry
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.unlink(idx);
        self.free_node(idx);
        let node = self.nodes[idx].take()?;
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }

    /// Walk the recency list and verify it agrees with the key index
    pub fn check_invariants(&self) -> Result<()> {
        let len = self.map.len();
        if len > self.capacity {
            return Err(Error::Corrupted(format!(
                "len {} exceeds capacity {}",
                len, self.capacity
            )));
        }

        let mut seen = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            if seen >= len {
                return Err(Error::Corrupted(
                    "recency list is longer than the key index".to_string(),
                ));
            }
            let node = self
                .nodes
                .get(idx)
                .and_then(Option::as_ref)
                .ok_or_else(|| Error::Corrupted(format!("recency list links to empty slot {}", idx)))?;
            if node.prev != prev {
                return Err(Error::Corrupted(format!("broken back-link at slot {}", idx)));
            }
            if self.map.get(&node.key) != Some(&idx) {
                return Err(Error::Corrupted(format!(
                    "slot {} is not indexed by its key",
                    idx
                )));
            }
            seen += 1;
            prev = Some(idx);
            cursor = node.next;
        }

        if self.tail != prev {
            return Err(Error::Corrupted(
                "tail does not terminate the recency list".to_string(),
            ));
        }
        if seen != len {
            return Err(Error::Corrupted(format!(
                "recency list holds {} keys but the index holds {}",
                seen, len
            )));
        }

        let live = self.nodes.iter().filter(|slot| slot.is_some()).count();
        if live + self.free_list.len() != self.nodes.len() {
            return Err(Error::Corrupted(format!(
                "{} live and {} free slots do not cover {} slots",
                live,
                self.free_list.len(),
                self.nodes.len()
            )));
        }

        Ok(())
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return; // Already at front
        }

        self.unlink(idx);
        self.link_front(idx);
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = old_head;
        }

        match old_head {
            Some(head_idx) => {
                if let Some(head) = &mut self.nodes[head_idx] {
                    head.prev = Some(idx);
                }
            }
            None => {
                self.tail = Some(idx);
            }
        }

        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over cache entries from least to most recently used
pub struct Iter<'a, K, V> {
    nodes: &'a [Option<Node<K, V>>],
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.nodes[idx].as_ref()?;
        self.cursor = node.prev;
        self.remaining = self.remaining.saturating_sub(1);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<K: Clone, V>(cache: &LruCache<K, V>) -> Vec<K> {
        cache.iter().map(|(k, _)| k.clone()).collect()
    }

    #[test]
    fn test_lru_basic() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");

        assert_eq!(cache.get(&1), Some(&"a"));
        assert_eq!(cache.get(&2), Some(&"b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_zero_capacity() {
        let result = LruCache::<u32, u32>::new(0);
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        cache.put(3, "c"); // Should evict 1

        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(&"b"));
        assert_eq!(cache.get(&3), Some(&"c"));
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_eviction_reports_entry() {
        let mut cache = LruCache::new(1).unwrap();

        assert_eq!(cache.insert(1, "a"), (None, None));
        assert_eq!(cache.insert(2, "b"), (None, Some((1, "a"))));
        assert_eq!(cache.insert(2, "c"), (Some("b"), None));
    }

    #[test]
    fn test_lru_update() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        cache.get(&1); // Move 1 to front
        cache.put(3, "c"); // Should evict 2

        assert_eq!(cache.get(&1), Some(&"a"));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), Some(&"c"));
    }

    #[test]
    fn test_lru_remove() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        cache.put(3, "c");

        assert_eq!(cache.remove(&2), Some("b"));
        assert_eq!(cache.remove(&2), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&2), None);
        assert_eq!(keys(&cache), vec![1, 3]);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_clear() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        cache.clear();

        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());

        cache.put(3, "c");
        assert_eq!(keys(&cache), vec![3]);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_overwrite() {
        let mut cache = LruCache::new(2).unwrap();

        assert_eq!(cache.put(1, "a"), None);
        assert_eq!(cache.put(1, "b"), Some("a")); // Overwrite

        assert_eq!(cache.get(&1), Some(&"b"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_overwrite_does_not_evict() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        cache.put(1, "z");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek(&1), Some(&"z"));
        assert_eq!(cache.peek(&2), Some(&"b"));
        // The overwrite refreshed 1, so 2 is next in line
        assert_eq!(keys(&cache), vec![2, 1]);
    }

    #[test]
    fn test_lru_peek_and_contains_keep_order() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");

        assert_eq!(cache.peek(&1), Some(&"a"));
        assert!(cache.contains_key(&1));
        assert!(cache.contains_value(&"a"));
        assert!(!cache.contains_value(&"q"));

        cache.put(3, "c");
        assert!(!cache.contains_key(&1));
    }

    #[test]
    fn test_lru_iter_order() {
        let mut cache = LruCache::new(4).unwrap();

        for i in 1..=4 {
            cache.put(i, i * 10);
        }
        cache.get(&2);

        assert_eq!(keys(&cache), vec![1, 3, 4, 2]);
        assert_eq!(cache.iter().len(), 4);
    }

    #[test]
    fn test_lru_pop_lru() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put("x", 1);
        cache.put("y", 2);

        assert_eq!(cache.pop_lru(), Some(("x", 1)));
        assert_eq!(cache.pop_lru(), Some(("y", 2)));
        assert_eq!(cache.pop_lru(), None);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_borrowed_lookup() {
        let mut cache: LruCache<String, u32> = LruCache::new(2).unwrap();

        cache.put("alpha".to_string(), 1);

        assert_eq!(cache.get("alpha"), Some(&1));
        assert!(cache.contains_key("alpha"));
        assert_eq!(cache.remove("alpha"), Some(1));
    }

    #[test]
    fn test_lru_slot_reuse() {
        let mut cache = LruCache::new(3).unwrap();

        for round in 0..100u32 {
            cache.put(round, round);
            if round % 3 == 0 {
                cache.remove(&round);
            }
        }

        assert!(cache.nodes.len() <= 4);
        assert!(cache.len() <= 3);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn test_lru_check_invariants_detects_corruption() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");
        cache.map.insert(9, 0);

        assert!(matches!(cache.check_invariants(), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_lru_debug_lists_entries() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a");
        cache.put(2, "b");

        assert_eq!(format!("{:?}", cache), r#"{1: "a", 2: "b"}"#);
    }
}

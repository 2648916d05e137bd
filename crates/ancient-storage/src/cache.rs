//! Item Caches
//!
//! Two per-family caches sit in front of the object backend:
//!
//! - [`WriteCache`] holds appended items that have not yet been flushed as a
//!   complete chunk. It never evicts: an evicted entry would be an item lost
//!   before it reached the backend. Its capacity is a high-water mark the
//!   freezer checks before inserting.
//! - [`ReadCache`] holds recently appended or downloaded items and evicts the
//!   least recently used entry when full.
//!
//! ## Chunk assembly
//!
//! ```text
//! write cache (G = 4):   [4 5 6 7][8 9]
//!                         ────┬──── ─┬─
//!                   complete chunk   partial chunk
//!                   upload + splice  upload, keep
//! ```
//!
//! Both caches support ordered key iteration and `truncate_from(n)`; the
//! write cache additionally supports `splice(k)`, dropping its `k` lowest keys
//! once their chunk is durable.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use lru::LruCache;

/// Ordered, non-evicting map from item number to pending item.
#[derive(Debug)]
pub struct WriteCache<T> {
    items: BTreeMap<u64, T>,
    capacity: usize,
}

impl<T: Clone> WriteCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: BTreeMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the cache has reached its high-water mark.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn get(&self, number: u64) -> Option<&T> {
        self.items.get(&number)
    }

    pub fn contains(&self, number: u64) -> bool {
        self.items.contains_key(&number)
    }

    pub fn insert(&mut self, number: u64, item: T) {
        self.items.insert(number, item);
    }

    /// Lowest item number present.
    pub fn first_key(&self) -> Option<u64> {
        self.items.keys().next().copied()
    }

    /// Item numbers in ascending order.
    pub fn keys(&self) -> Vec<u64> {
        self.items.keys().copied().collect()
    }

    /// Clones of the items numbered `start..end` that are present, in order.
    pub fn range(&self, start: u64, end: u64) -> Vec<(u64, T)> {
        self.items
            .range(start..end)
            .map(|(number, item)| (*number, item.clone()))
            .collect()
    }

    /// Drop every item numbered `n` or above.
    pub fn truncate_from(&mut self, n: u64) {
        self.items.split_off(&n);
    }

    /// Drop the `k` lowest items.
    pub fn splice(&mut self, k: usize) {
        if k >= self.items.len() {
            self.items.clear();
            return;
        }
        if let Some(split_at) = self.items.keys().nth(k).copied() {
            self.items = self.items.split_off(&split_at);
        }
    }
}

/// LRU map from item number to recently seen item.
#[derive(Debug)]
pub struct ReadCache<T> {
    items: LruCache<u64, T>,
}

impl<T: Clone> ReadCache<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            items: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.cap().get()
    }

    /// Clone of the item, marking it most recently used.
    pub fn get(&mut self, number: u64) -> Option<T> {
        self.items.get(&number).cloned()
    }

    pub fn put(&mut self, number: u64, item: T) {
        self.items.put(number, item);
    }

    /// Insert `item` unless `number` is already cached. Cached entries are
    /// never replaced and not promoted.
    pub fn fill(&mut self, number: u64, item: T) {
        if !self.items.contains(&number) {
            self.items.put(number, item);
        }
    }

    /// Item numbers in ascending order.
    pub fn keys(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = self.items.iter().map(|(number, _)| *number).collect();
        keys.sort_unstable();
        keys
    }

    /// Drop every item numbered `n` or above.
    pub fn truncate_from(&mut self, n: u64) {
        let stale: Vec<u64> = self
            .items
            .iter()
            .map(|(number, _)| *number)
            .filter(|number| *number >= n)
            .collect();
        for number in stale {
            self.items.pop(&number);
        }
    }
}

//! Weighted LRU index
//!
//! An LRU map bounded by the sum of entry weights instead of the entry count.
//! Insertion and capacity changes hand back whatever they evicted, so the
//! caller decides what happens to evicted values (the cache dispatches their
//! on-disk removal to background workers).

use std::borrow::Borrow;
use std::hash::Hash;

use lru::LruCache;

/// What an insertion displaced
#[derive(Debug)]
pub struct Insertion<K, V> {
    /// Previous value stored under the same key
    pub replaced: Option<V>,
    /// Entries evicted to make room, least recently used first.
    ///
    /// Contains the inserted entry itself when its weight alone exceeds the
    /// capacity.
    pub evicted: Vec<(K, V)>,
}

/// LRU map whose total weight never exceeds its capacity
pub struct WeightedLru<K: Hash + Eq, V> {
    entries: LruCache<K, (V, u64)>,
    capacity: u64,
    total_weight: u64,
}

impl<K: Hash + Eq, V> WeightedLru<K, V> {
    /// Create an empty map bounded by `capacity` weight units
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity,
            total_weight: 0,
        }
    }

    /// Insert `value` as the most recently used entry
    ///
    /// Weights below 1 count as 1. An entry heavier than the whole capacity
    /// is not stored; it is returned in `evicted` and the other entries stay
    /// untouched.
    pub fn insert(&mut self, key: K, value: V, weight: u64) -> Insertion<K, V> {
        let weight = weight.max(1);

        let replaced = self.entries.pop(&key).map(|(old, old_weight)| {
            self.total_weight -= old_weight;
            old
        });

        if weight > self.capacity {
            return Insertion {
                replaced,
                evicted: vec![(key, value)],
            };
        }

        self.entries.put(key, (value, weight));
        self.total_weight += weight;

        Insertion {
            replaced,
            evicted: self.evict_over_capacity(),
        }
    }

    /// Look up an entry and mark it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Look up an entry without touching its recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.peek(key).map(|(value, _)| value)
    }

    /// Remove an entry
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.pop(key).map(|(value, weight)| {
            self.total_weight -= weight;
            value
        })
    }

    /// Change the capacity, evicting immediately until the new bound holds
    pub fn set_capacity(&mut self, capacity: u64) -> Vec<(K, V)> {
        self.capacity = capacity;
        self.evict_over_capacity()
    }

    /// Remove every entry, least recently used first
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some((key, (value, _))) = self.entries.pop_lru() {
            drained.push((key, value));
        }
        self.total_weight = 0;
        drained
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the weights of all entries
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn evict_over_capacity(&mut self) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        while self.total_weight > self.capacity {
            match self.entries.pop_lru() {
                Some((key, (value, weight))) => {
                    self.total_weight -= weight;
                    evicted.push((key, value));
                }
                None => break,
            }
        }
        evicted
    }
}

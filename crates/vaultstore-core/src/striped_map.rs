//! Striped concurrent map — `name → value` with per-bucket locking.
//!
//! Keys are hashed onto a small prime number of buckets, each guarded by
//! its own `RwLock`. Readers on different buckets never contend; writers
//! serialize per bucket. The map enforces a caller-supplied capacity on
//! insertion: a slot is reserved on the shared atomic size with a CAS loop
//! before the entry is pushed, so concurrent inserts can never drive the
//! map over its limit.
//!
//! **Size accuracy**: `len()` is a lock-free atomic read. It is exact while
//! a bucket lock is held and approximate between acquires.
//!
//! **Re-entrancy**: `clear` and `for_each` take bucket locks in index
//! order. Callbacks passed to `for_each` must not re-enter the same map —
//! doing so can self-deadlock on a bucket lock.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// Number of lock stripes. A small prime keeps the bucket spread even for
/// short alphanumeric names.
pub const DEFAULT_NUM_BUCKETS: usize = 13;

/// Concurrent map from names to values with bounded capacity.
pub struct StripedMap<V> {
    buckets: Vec<RwLock<Vec<(String, V)>>>,
    len: AtomicUsize,
    hasher: RandomState,
}

impl<V: Clone> StripedMap<V> {
    /// Create a map with the default stripe count.
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_NUM_BUCKETS)
    }

    /// Create a map with an explicit stripe count (must be non-zero).
    pub fn with_buckets(num_buckets: usize) -> Self {
        assert!(num_buckets > 0, "striped map needs at least one bucket");
        let mut buckets = Vec::with_capacity(num_buckets);
        for _ in 0..num_buckets {
            buckets.push(RwLock::new(Vec::new()));
        }
        Self {
            buckets,
            len: AtomicUsize::new(0),
            hasher: RandomState::new(),
        }
    }

    fn bucket_index(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) % self.buckets.len() as u64) as usize
    }

    /// Reserve one slot against `max` with a CAS loop on the shared size.
    /// Returns false when the map is at capacity.
    fn try_reserve(&self, max: usize) -> bool {
        let mut current = self.len.load(Ordering::Relaxed);
        loop {
            if current >= max {
                return false;
            }
            match self.len.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Look up a key, returning a copy of the value.
    pub fn find(&self, key: &str) -> Option<V> {
        let bucket = self.buckets[self.bucket_index(key)].read();
        bucket
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    }

    /// Insert a new entry or overwrite an existing one.
    ///
    /// Overwriting always succeeds; a fresh insert succeeds only while the
    /// map holds fewer than `max` entries. Returns false when the capacity
    /// ceiling is hit.
    pub fn insert_with_limit_or_assign(&self, key: &str, value: V, max: usize) -> bool {
        let mut bucket = self.buckets[self.bucket_index(key)].write();
        if let Some(entry) = bucket.iter_mut().find(|(name, _)| name == key) {
            entry.1 = value;
            return true;
        }
        if !self.try_reserve(max) {
            return false;
        }
        bucket.push((key.to_string(), value));
        true
    }

    /// Return the existing value for `key`, or insert `value` if absent.
    ///
    /// On success the returned bool is true iff the value was freshly
    /// inserted. Returns `None` when the key is absent and the map is at
    /// capacity.
    pub fn find_or_insert_with_limit(&self, key: &str, value: V, max: usize) -> Option<(V, bool)> {
        let mut bucket = self.buckets[self.bucket_index(key)].write();
        if let Some((_, existing)) = bucket.iter().find(|(name, _)| name == key) {
            return Some((existing.clone(), false));
        }
        if !self.try_reserve(max) {
            return None;
        }
        bucket.push((key.to_string(), value.clone()));
        Some((value, true))
    }

    /// Remove an entry. Returns the number of entries removed (0 or 1).
    pub fn erase(&self, key: &str) -> usize {
        let mut bucket = self.buckets[self.bucket_index(key)].write();
        match bucket.iter().position(|(name, _)| name == key) {
            Some(index) => {
                bucket.remove(index);
                self.len.fetch_sub(1, Ordering::Relaxed);
                1
            }
            None => 0,
        }
    }

    /// Remove every entry.
    ///
    /// All bucket locks are acquired in index order and held together, so
    /// the map is observably empty the moment this returns.
    pub fn clear(&self) {
        let mut guards = Vec::with_capacity(self.buckets.len());
        for bucket in &self.buckets {
            guards.push(bucket.write());
        }
        for guard in &mut guards {
            guard.clear();
        }
        self.len.store(0, Ordering::Relaxed);
    }

    /// Apply `f` to every value.
    ///
    /// Buckets are visited in index order under their shared locks, one at
    /// a time; entries observed in one bucket stay consistent while `f`
    /// runs on them. Values may hold strong references, so `f` may safely
    /// retain what it is given.
    pub fn for_each(&self, mut f: impl FnMut(&V)) {
        for bucket in &self.buckets {
            let guard = bucket.read();
            for (_, value) in guard.iter() {
                f(value);
            }
        }
    }

    /// Current entry count (lock-free, approximate between acquires).
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// True if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for StripedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

//! Small lock-guarded collections for state shared between tasks.
//!
//! The hub coordinator owns the client registry and subscription index
//! outright, and never uses these. They exist for per-client state that is
//! touched by many request tasks at once (metadata, in-flight counts) and for
//! hub-wide statistics.

use parking_lot::RwLock;
use std::{
    borrow::Borrow,
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// A [`RwLock`]-guarded [`HashMap`].
///
/// Every operation takes the lock for the duration of the call only. No
/// reference into the map escapes the lock, so values are returned by clone.
#[derive(Debug)]
pub struct SyncMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for SyncMap<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value if any.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Insert a value only if the key is absent. Returns `true` if the value
    /// was inserted.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut map = self.inner.write();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    /// Remove a value, returning it if present.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().remove(key)
    }

    /// True if the key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().contains_key(key)
    }

    /// Get a clone of the value for a key.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner.read().get(key).cloned()
    }

    /// Run a closure with shared access to the whole map.
    pub fn with<R>(&self, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run a closure with exclusive access to the whole map. Use this for
    /// read-modify-write updates.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.write().clear()
    }
}

/// A shareable atomic counter. Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    /// Create a counter starting at `value`.
    pub fn new(value: u64) -> Self {
        Self(Arc::new(AtomicU64::new(value)))
    }

    /// Increment by one, returning the new value.
    pub fn incr(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Add `n`, returning the new value.
    pub fn add(&self, n: u64) -> u64 {
        self.0.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Decrement by one, saturating at zero. Returns the new value.
    pub fn decr(&self) -> u64 {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            })
            .unwrap_or_else(|v| v);
        prev.saturating_sub(1)
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Increment now, and decrement when the returned guard is dropped.
    pub fn guard(&self) -> CounterGuard {
        self.incr();
        CounterGuard(self.clone())
    }
}

/// Decrements its [`Counter`] on drop. See [`Counter::guard`].
#[derive(Debug)]
pub struct CounterGuard(Counter);

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.0.decr();
    }
}

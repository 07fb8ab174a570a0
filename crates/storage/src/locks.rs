//! Per-key async read/write locks.
//!
//! Chunk writes for a fingerprint share the lock; merge and cancel take it
//! exclusively. Entries are dropped from the map once the last guard for a key
//! goes away, so the map only holds keys with work in flight.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// A set of async read/write locks keyed by `K`.
pub struct KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    inner: Arc<DashMap<K, Arc<RwLock<()>>>>,
}

impl<K> Clone for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &K) -> Arc<RwLock<()>> {
        // Clone out of the entry so no shard lock is held across an await.
        self.inner
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .value()
            .clone()
    }

    /// Acquire a shared lock.
    pub async fn read(&self, key: &K) -> KeyedGuard<K, OwnedRwLockReadGuard<()>> {
        let guard = self.acquire(key, |lock| lock.read_owned()).await;
        self.guard(key, guard)
    }

    /// Acquire an exclusive lock.
    pub async fn write(&self, key: &K) -> KeyedGuard<K, OwnedRwLockWriteGuard<()>> {
        let guard = self.acquire(key, |lock| lock.write_owned()).await;
        self.guard(key, guard)
    }

    fn acquire<'a, F>(
        &'a self,
        key: &'a K,
        start: impl FnOnce(Arc<RwLock<()>>) -> F,
    ) -> Acquire<'a, K, F> {
        Acquire {
            locks: self,
            key,
            wait: Some(Box::pin(start(self.lock_for(key)))),
        }
    }

    /// Acquire an exclusive lock only if nobody holds the key.
    pub fn try_write(&self, key: &K) -> Option<KeyedGuard<K, OwnedRwLockWriteGuard<()>>> {
        let lock = self.lock_for(key);
        match lock.try_write_owned() {
            Ok(guard) => Some(self.guard(key, guard)),
            Err(_) => {
                self.release(key);
                None
            }
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn guard<G>(&self, key: &K, guard: G) -> KeyedGuard<K, G> {
        KeyedGuard {
            guard: Some(guard),
            key: key.clone(),
            locks: self.clone(),
        }
    }

    fn release(&self, key: &K) {
        // Only the map itself still references the lock.
        self.inner
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// A pending acquisition. Dropped before it resolves (the caller was
/// cancelled), it gives up its reference to the lock and then releases the
/// map entry, which it may have been the last user of.
struct Acquire<'a, K, F>
where
    K: Eq + Hash + Clone,
{
    locks: &'a KeyedLocks<K>,
    key: &'a K,
    wait: Option<Pin<Box<F>>>,
}

impl<K, F> Future for Acquire<'_, K, F>
where
    K: Eq + Hash + Clone,
    F: Future,
{
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let Some(wait) = self.wait.as_mut() else {
            return Poll::Pending;
        };
        let guard = ready!(wait.as_mut().poll(cx));
        self.wait = None;
        Poll::Ready(guard)
    }
}

impl<K, F> Drop for Acquire<'_, K, F>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        let cancelled = self.wait.take().is_some();
        if cancelled {
            self.locks.release(self.key);
        }
    }
}

/// Guard returned by [`KeyedLocks`]. Releases the lock on drop.
pub struct KeyedGuard<K, G>
where
    K: Eq + Hash + Clone,
{
    guard: Option<G>,
    key: K,
    locks: KeyedLocks<K>,
}

impl<K, G> Drop for KeyedGuard<K, G>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // The owned guard holds an Arc to the lock; drop it first.
        drop(self.guard.take());
        self.locks.release(&self.key);
    }
}

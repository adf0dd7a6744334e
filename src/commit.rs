//! Batched commits for disk-backed containers.
//!
//! Spilled containers are scratch space for a single evaluation, so they do
//! not need a sync per write. The wrappers here count mutations and ask the
//! store to commit once every `interval` of them.

use std::sync::Arc;

use crate::collection::{Element, Entries, MapLike, SetLike};
use crate::error::Result;
use crate::store::SpillStore;

pub trait Committer: Send + Sync {
    fn commit(&self) -> Result<()>;
}

impl Committer for SpillStore {
    fn commit(&self) -> Result<()> {
        SpillStore::commit(self)
    }
}

// ------------- Batcher -------------
struct Batcher {
    committer: Arc<dyn Committer>,
    interval: i64,
    mutations: u64,
}

impl Batcher {
    fn new(committer: Arc<dyn Committer>, interval: i64) -> Self {
        Self {
            committer,
            interval,
            mutations: 0,
        }
    }
    // commits whenever the running count passes a multiple of the interval
    fn record(&mut self, touched: usize) -> Result<()> {
        if self.interval <= 0 || touched == 0 {
            return Ok(());
        }
        let interval = self.interval as u64;
        let before = self.mutations;
        self.mutations += touched as u64;
        if self.mutations / interval > before / interval {
            self.committer.commit()?;
        }
        Ok(())
    }
}

// ------------- CommittingSet -------------
pub struct CommittingSet<S> {
    inner: S,
    batcher: Batcher,
}

impl<S> CommittingSet<S> {
    pub fn new(inner: S, committer: Arc<dyn Committer>, interval: i64) -> Self {
        Self {
            inner,
            batcher: Batcher::new(committer, interval),
        }
    }
    pub fn mutations(&self) -> u64 {
        self.batcher.mutations
    }
}

impl<T: Element, S: SetLike<T>> SetLike<T> for CommittingSet<S> {
    fn insert(&mut self, item: T) -> Result<bool> {
        let changed = self.inner.insert(item)?;
        self.batcher.record(1)?;
        Ok(changed)
    }
    fn insert_all(&mut self, items: Vec<T>) -> Result<bool> {
        let touched = items.len();
        let changed = self.inner.insert_all(items)?;
        self.batcher.record(touched)?;
        Ok(changed)
    }
    fn remove(&mut self, item: &T) -> Result<bool> {
        let changed = self.inner.remove(item)?;
        self.batcher.record(1)?;
        Ok(changed)
    }
    fn retain_all(&mut self, keep: &[T]) -> Result<bool> {
        let before = self.inner.len();
        let changed = self.inner.retain_all(keep)?;
        self.batcher.record(before - self.inner.len())?;
        Ok(changed)
    }
    fn clear(&mut self) -> Result<()> {
        self.inner.clear()?;
        self.batcher.record(1)
    }
    fn contains(&self, item: &T) -> Result<bool> {
        self.inner.contains(item)
    }
    fn contains_all(&self, items: &[T]) -> Result<bool> {
        self.inner.contains_all(items)
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
    fn iter(&self) -> Entries<'_, T> {
        self.inner.iter()
    }
    fn is_spilled(&self) -> bool {
        self.inner.is_spilled()
    }
}

// ------------- CommittingMap -------------
pub struct CommittingMap<M> {
    inner: M,
    batcher: Batcher,
}

impl<M> CommittingMap<M> {
    pub fn new(inner: M, committer: Arc<dyn Committer>, interval: i64) -> Self {
        Self {
            inner,
            batcher: Batcher::new(committer, interval),
        }
    }
    pub fn mutations(&self) -> u64 {
        self.batcher.mutations
    }
}

impl<K: Element, V: Clone + Send + 'static, M: MapLike<K, V>> MapLike<K, V> for CommittingMap<M> {
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        let previous = self.inner.insert(key, value)?;
        self.batcher.record(1)?;
        Ok(previous)
    }
    fn insert_all(&mut self, entries: Vec<(K, V)>) -> Result<()> {
        let touched = entries.len();
        self.inner.insert_all(entries)?;
        self.batcher.record(touched)
    }
    fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let previous = self.inner.remove(key)?;
        self.batcher.record(1)?;
        Ok(previous)
    }
    fn clear(&mut self) -> Result<()> {
        self.inner.clear()?;
        self.batcher.record(1)
    }
    fn get(&self, key: &K) -> Result<Option<V>> {
        self.inner.get(key)
    }
    fn contains_key(&self, key: &K) -> Result<bool> {
        self.inner.contains_key(key)
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
    fn iter(&self) -> Entries<'_, (K, V)> {
        self.inner.iter()
    }
    fn is_spilled(&self) -> bool {
        self.inner.is_spilled()
    }
}

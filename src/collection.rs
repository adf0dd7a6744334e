//! The container surfaces handed out to query evaluation, and their plain
//! in-memory implementations.
//!
//! Every operation that may touch the disk returns a [`Result`]; sizes are
//! tracked in memory by every implementation, so `len` never fails.

use core::hash::{BuildHasher, BuildHasherDefault};
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use seahash::SeaHasher;

use crate::error::Result;

pub type ElementHasher = BuildHasherDefault<SeaHasher>;
pub type MemorySet<T> = HashSet<T, ElementHasher>;
pub type MemoryMap<K, V> = HashMap<K, V, ElementHasher>;
pub type MemoryQueue<T> = VecDeque<T>;

/// Anything that can be a set member or a map key.
pub trait Element: Eq + Hash + Clone + Send + 'static {}
impl<T: Eq + Hash + Clone + Send + 'static> Element for T {}

/// Iteration may read from disk, so each item can fail on its own.
pub type Entries<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

pub type DynSet<T> = Box<dyn SetLike<T>>;
pub type DynMap<K, V> = Box<dyn MapLike<K, V>>;
pub type DynQueue<T> = Box<dyn QueueLike<T>>;

// ------------- Set -------------
pub trait SetLike<T: Element>: Send {
    fn insert(&mut self, item: T) -> Result<bool>;
    fn remove(&mut self, item: &T) -> Result<bool>;
    fn contains(&self, item: &T) -> Result<bool>;
    fn len(&self) -> usize;
    fn clear(&mut self) -> Result<()>;
    fn iter(&self) -> Entries<'_, T>;

    fn insert_all(&mut self, items: Vec<T>) -> Result<bool> {
        let mut changed = false;
        for item in items {
            changed |= self.insert(item)?;
        }
        Ok(changed)
    }
    fn contains_all(&self, items: &[T]) -> Result<bool> {
        for item in items {
            if !self.contains(item)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
    /// Keeps only the members that also appear in `keep`.
    fn retain_all(&mut self, keep: &[T]) -> Result<bool> {
        let keep: MemorySet<&T> = keep.iter().collect();
        let mut doomed = Vec::new();
        for item in self.iter() {
            let item = item?;
            if !keep.contains(&item) {
                doomed.push(item);
            }
        }
        for item in &doomed {
            self.remove(item)?;
        }
        Ok(!doomed.is_empty())
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn to_vec(&self) -> Result<Vec<T>> {
        self.iter().collect()
    }
    fn is_spilled(&self) -> bool {
        false
    }
}

impl<T: Element, S: BuildHasher + Send> SetLike<T> for HashSet<T, S> {
    fn insert(&mut self, item: T) -> Result<bool> {
        Ok(HashSet::insert(self, item))
    }
    fn remove(&mut self, item: &T) -> Result<bool> {
        Ok(HashSet::remove(self, item))
    }
    fn contains(&self, item: &T) -> Result<bool> {
        Ok(HashSet::contains(self, item))
    }
    fn len(&self) -> usize {
        HashSet::len(self)
    }
    fn clear(&mut self) -> Result<()> {
        HashSet::clear(self);
        Ok(())
    }
    fn iter(&self) -> Entries<'_, T> {
        Box::new(HashSet::iter(self).cloned().map(Ok))
    }
    fn retain_all(&mut self, keep: &[T]) -> Result<bool> {
        let before = HashSet::len(self);
        let keep: MemorySet<&T> = keep.iter().collect();
        self.retain(|item| keep.contains(item));
        Ok(HashSet::len(self) != before)
    }
}

// ------------- Map -------------
pub trait MapLike<K: Element, V: Clone + Send + 'static>: Send {
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>>;
    fn get(&self, key: &K) -> Result<Option<V>>;
    fn remove(&mut self, key: &K) -> Result<Option<V>>;
    fn len(&self) -> usize;
    fn clear(&mut self) -> Result<()>;
    fn iter(&self) -> Entries<'_, (K, V)>;

    fn insert_all(&mut self, entries: Vec<(K, V)>) -> Result<()> {
        for (key, value) in entries {
            self.insert(key, value)?;
        }
        Ok(())
    }
    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn is_spilled(&self) -> bool {
        false
    }
}

impl<K: Element, V: Clone + Send + 'static, S: BuildHasher + Send> MapLike<K, V>
    for HashMap<K, V, S>
{
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        Ok(HashMap::insert(self, key, value))
    }
    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(HashMap::get(self, key).cloned())
    }
    fn remove(&mut self, key: &K) -> Result<Option<V>> {
        Ok(HashMap::remove(self, key))
    }
    fn len(&self) -> usize {
        HashMap::len(self)
    }
    fn clear(&mut self) -> Result<()> {
        HashMap::clear(self);
        Ok(())
    }
    fn iter(&self) -> Entries<'_, (K, V)> {
        Box::new(HashMap::iter(self).map(|(k, v)| Ok((k.clone(), v.clone()))))
    }
    fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(HashMap::contains_key(self, key))
    }
}

// ------------- Queue -------------
pub trait QueueLike<T: Clone + Send + 'static>: Send {
    fn offer(&mut self, item: T) -> Result<()>;
    fn peek(&self) -> Result<Option<T>>;
    fn poll(&mut self) -> Result<Option<T>>;
    fn len(&self) -> usize;
    fn iter(&self) -> Entries<'_, T>;

    fn offer_all(&mut self, items: Vec<T>) -> Result<()> {
        for item in items {
            self.offer(item)?;
        }
        Ok(())
    }
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn is_spilled(&self) -> bool {
        false
    }
}

impl<T: Clone + Send + 'static> QueueLike<T> for VecDeque<T> {
    fn offer(&mut self, item: T) -> Result<()> {
        self.push_back(item);
        Ok(())
    }
    fn peek(&self) -> Result<Option<T>> {
        Ok(self.front().cloned())
    }
    fn poll(&mut self) -> Result<Option<T>> {
        Ok(self.pop_front())
    }
    fn len(&self) -> usize {
        VecDeque::len(self)
    }
    fn iter(&self) -> Entries<'_, T> {
        Box::new(VecDeque::iter(self).cloned().map(Ok))
    }
}

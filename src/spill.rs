//! Containers that start in memory and move, once and for all, to the disk
//! store when they outgrow their threshold.
//!
//! The disk container is produced on demand by a spiller closure, which is
//! only called at the moment of migration. A threshold of zero or less means
//! the container never spills.
//!
//! Migration happens before the element that crosses the threshold is
//! written. If it fails the error is returned, the container keeps its
//! previous in-memory contents without that element, and a later mutation
//! tries again.

use tracing::debug;

use crate::collection::{
    DynMap, DynQueue, DynSet, Element, Entries, MapLike, MemoryMap, MemoryQueue, MemorySet,
    QueueLike, SetLike,
};
use crate::error::Result;

/// Produces the disk-backed set for the container with the given name.
pub type SetSpiller<T> = Box<dyn Fn(&str) -> Result<DynSet<T>> + Send + Sync>;
pub type MapSpiller<K, V> = Box<dyn Fn(&str) -> Result<DynMap<K, V>> + Send + Sync>;
pub type QueueSpiller<T> = Box<dyn Fn(&str) -> Result<DynQueue<T>> + Send + Sync>;

fn exceeds(threshold: i64, size: usize) -> bool {
    threshold > 0 && size as i64 > threshold
}

// ------------- SpillableSet -------------
enum SetState<T: Element> {
    InMemory(MemorySet<T>),
    Spilled(DynSet<T>),
}

pub struct SpillableSet<T: Element> {
    name: String,
    threshold: i64,
    state: SetState<T>,
    spiller: SetSpiller<T>,
}

impl<T: Element> SpillableSet<T> {
    pub fn new(name: impl Into<String>, threshold: i64, spiller: SetSpiller<T>) -> Self {
        Self {
            name: name.into(),
            threshold,
            state: SetState::InMemory(MemorySet::default()),
            spiller,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn threshold(&self) -> i64 {
        self.threshold
    }
    fn migrate(&mut self) -> Result<()> {
        let SetState::InMemory(memory) = &self.state else {
            return Ok(());
        };
        let mut disk = (self.spiller)(&self.name)?;
        disk.insert_all(memory.iter().cloned().collect())?;
        debug!(
            name = %self.name,
            elements = memory.len(),
            threshold = self.threshold,
            "set spilled to disk"
        );
        self.state = SetState::Spilled(disk);
        Ok(())
    }
}

impl<T: Element> SetLike<T> for SpillableSet<T> {
    fn insert(&mut self, item: T) -> Result<bool> {
        match &mut self.state {
            SetState::InMemory(memory) => {
                let grows = !memory.contains(&item);
                if !(grows && exceeds(self.threshold, memory.len() + 1)) {
                    return Ok(memory.insert(item));
                }
            }
            SetState::Spilled(disk) => return disk.insert(item),
        }
        // migrate before inserting so a failed migration leaves the set untouched
        self.migrate()?;
        match &mut self.state {
            SetState::Spilled(disk) => disk.insert(item),
            SetState::InMemory(memory) => Ok(memory.insert(item)),
        }
    }
    fn insert_all(&mut self, items: Vec<T>) -> Result<bool> {
        if let SetState::InMemory(memory) = &self.state {
            if exceeds(self.threshold, memory.len() + items.len()) {
                self.migrate()?;
            }
        }
        match &mut self.state {
            SetState::InMemory(memory) => SetLike::insert_all(memory, items),
            SetState::Spilled(disk) => disk.insert_all(items),
        }
    }
    fn remove(&mut self, item: &T) -> Result<bool> {
        match &mut self.state {
            SetState::InMemory(memory) => Ok(memory.remove(item)),
            SetState::Spilled(disk) => disk.remove(item),
        }
    }
    fn retain_all(&mut self, keep: &[T]) -> Result<bool> {
        match &mut self.state {
            SetState::InMemory(memory) => SetLike::retain_all(memory, keep),
            SetState::Spilled(disk) => disk.retain_all(keep),
        }
    }
    fn contains(&self, item: &T) -> Result<bool> {
        match &self.state {
            SetState::InMemory(memory) => Ok(memory.contains(item)),
            SetState::Spilled(disk) => disk.contains(item),
        }
    }
    fn contains_all(&self, items: &[T]) -> Result<bool> {
        match &self.state {
            SetState::InMemory(memory) => Ok(items.iter().all(|item| memory.contains(item))),
            SetState::Spilled(disk) => disk.contains_all(items),
        }
    }
    fn len(&self) -> usize {
        match &self.state {
            SetState::InMemory(memory) => memory.len(),
            SetState::Spilled(disk) => disk.len(),
        }
    }
    fn clear(&mut self) -> Result<()> {
        match &mut self.state {
            SetState::InMemory(memory) => {
                memory.clear();
                Ok(())
            }
            SetState::Spilled(disk) => disk.clear(),
        }
    }
    fn iter(&self) -> Entries<'_, T> {
        match &self.state {
            SetState::InMemory(memory) => SetLike::iter(memory),
            SetState::Spilled(disk) => disk.iter(),
        }
    }
    fn is_spilled(&self) -> bool {
        matches!(self.state, SetState::Spilled(_))
    }
}

// ------------- SpillableQueue -------------
enum QueueState<T: Clone + Send + 'static> {
    InMemory(MemoryQueue<T>),
    Spilled(DynQueue<T>),
}

pub struct SpillableQueue<T: Clone + Send + 'static> {
    name: String,
    threshold: i64,
    state: QueueState<T>,
    spiller: QueueSpiller<T>,
}

impl<T: Clone + Send + 'static> SpillableQueue<T> {
    pub fn new(name: impl Into<String>, threshold: i64, spiller: QueueSpiller<T>) -> Self {
        Self {
            name: name.into(),
            threshold,
            state: QueueState::InMemory(MemoryQueue::new()),
            spiller,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    fn migrate(&mut self) -> Result<()> {
        let QueueState::InMemory(memory) = &self.state else {
            return Ok(());
        };
        let mut disk = (self.spiller)(&self.name)?;
        // offered in queue order so the disk positions keep FIFO order
        for item in memory {
            disk.offer(item.clone())?;
        }
        debug!(
            name = %self.name,
            elements = memory.len(),
            threshold = self.threshold,
            "queue spilled to disk"
        );
        self.state = QueueState::Spilled(disk);
        Ok(())
    }
}

impl<T: Clone + Send + 'static> QueueLike<T> for SpillableQueue<T> {
    fn offer(&mut self, item: T) -> Result<()> {
        match &mut self.state {
            QueueState::InMemory(memory) => {
                if !exceeds(self.threshold, memory.len() + 1) {
                    memory.push_back(item);
                    return Ok(());
                }
            }
            QueueState::Spilled(disk) => return disk.offer(item),
        }
        self.migrate()?;
        match &mut self.state {
            QueueState::Spilled(disk) => disk.offer(item),
            QueueState::InMemory(memory) => {
                memory.push_back(item);
                Ok(())
            }
        }
    }
    fn offer_all(&mut self, items: Vec<T>) -> Result<()> {
        if let QueueState::InMemory(memory) = &self.state {
            if exceeds(self.threshold, memory.len() + items.len()) {
                self.migrate()?;
            }
        }
        match &mut self.state {
            QueueState::InMemory(memory) => {
                memory.extend(items);
                Ok(())
            }
            QueueState::Spilled(disk) => disk.offer_all(items),
        }
    }
    fn peek(&self) -> Result<Option<T>> {
        match &self.state {
            QueueState::InMemory(memory) => Ok(memory.front().cloned()),
            QueueState::Spilled(disk) => disk.peek(),
        }
    }
    fn poll(&mut self) -> Result<Option<T>> {
        match &mut self.state {
            QueueState::InMemory(memory) => Ok(memory.pop_front()),
            QueueState::Spilled(disk) => disk.poll(),
        }
    }
    fn len(&self) -> usize {
        match &self.state {
            QueueState::InMemory(memory) => memory.len(),
            QueueState::Spilled(disk) => disk.len(),
        }
    }
    fn iter(&self) -> Entries<'_, T> {
        match &self.state {
            QueueState::InMemory(memory) => QueueLike::iter(memory),
            QueueState::Spilled(disk) => disk.iter(),
        }
    }
    fn is_spilled(&self) -> bool {
        matches!(self.state, QueueState::Spilled(_))
    }
}

// ------------- SpillableMap -------------
enum MapState<K: Element, V: Clone + Send + 'static> {
    InMemory(MemoryMap<K, V>),
    Spilled(DynMap<K, V>),
}

/// Maps spill once they hold more entries than the commit interval.
pub struct SpillableMap<K: Element, V: Clone + Send + 'static> {
    name: String,
    threshold: i64,
    state: MapState<K, V>,
    spiller: MapSpiller<K, V>,
}

impl<K: Element, V: Clone + Send + 'static> SpillableMap<K, V> {
    pub fn new(name: impl Into<String>, threshold: i64, spiller: MapSpiller<K, V>) -> Self {
        Self {
            name: name.into(),
            threshold,
            state: MapState::InMemory(MemoryMap::default()),
            spiller,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    fn migrate(&mut self) -> Result<()> {
        let MapState::InMemory(memory) = &self.state else {
            return Ok(());
        };
        let mut disk = (self.spiller)(&self.name)?;
        disk.insert_all(
            memory
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )?;
        debug!(
            name = %self.name,
            elements = memory.len(),
            threshold = self.threshold,
            "map spilled to disk"
        );
        self.state = MapState::Spilled(disk);
        Ok(())
    }
}

impl<K: Element, V: Clone + Send + 'static> MapLike<K, V> for SpillableMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        match &mut self.state {
            MapState::InMemory(memory) => {
                let grows = !memory.contains_key(&key);
                if !(grows && exceeds(self.threshold, memory.len() + 1)) {
                    return Ok(memory.insert(key, value));
                }
            }
            MapState::Spilled(disk) => return disk.insert(key, value),
        }
        self.migrate()?;
        match &mut self.state {
            MapState::Spilled(disk) => disk.insert(key, value),
            MapState::InMemory(memory) => Ok(memory.insert(key, value)),
        }
    }
    fn insert_all(&mut self, entries: Vec<(K, V)>) -> Result<()> {
        if let MapState::InMemory(memory) = &self.state {
            if exceeds(self.threshold, memory.len() + entries.len()) {
                self.migrate()?;
            }
        }
        match &mut self.state {
            MapState::InMemory(memory) => {
                memory.extend(entries);
                Ok(())
            }
            MapState::Spilled(disk) => disk.insert_all(entries),
        }
    }
    fn get(&self, key: &K) -> Result<Option<V>> {
        match &self.state {
            MapState::InMemory(memory) => Ok(memory.get(key).cloned()),
            MapState::Spilled(disk) => disk.get(key),
        }
    }
    fn remove(&mut self, key: &K) -> Result<Option<V>> {
        match &mut self.state {
            MapState::InMemory(memory) => Ok(memory.remove(key)),
            MapState::Spilled(disk) => disk.remove(key),
        }
    }
    fn contains_key(&self, key: &K) -> Result<bool> {
        match &self.state {
            MapState::InMemory(memory) => Ok(memory.contains_key(key)),
            MapState::Spilled(disk) => disk.contains_key(key),
        }
    }
    fn len(&self) -> usize {
        match &self.state {
            MapState::InMemory(memory) => memory.len(),
            MapState::Spilled(disk) => disk.len(),
        }
    }
    fn clear(&mut self) -> Result<()> {
        match &mut self.state {
            MapState::InMemory(memory) => {
                memory.clear();
                Ok(())
            }
            MapState::Spilled(disk) => disk.clear(),
        }
    }
    fn iter(&self) -> Entries<'_, (K, V)> {
        match &self.state {
            MapState::InMemory(memory) => MapLike::iter(memory),
            MapState::Spilled(disk) => disk.iter(),
        }
    }
    fn is_spilled(&self) -> bool {
        matches!(self.state, MapState::Spilled(_))
    }
}

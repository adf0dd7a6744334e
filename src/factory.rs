//! The collection factory that query evaluation gets all its containers from.
//!
//! One factory serves one evaluation. Containers it creates share a single
//! disk store, opened the first time any of them spills and closed together
//! with the factory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::binding::{BindingSet, BindingSetCodec};
use crate::codec::{Codec, I64Codec, SerdeCodec, ValueCodec};
use crate::collection::{
    DynMap, DynQueue, DynSet, Element, Entries, MapLike, MemoryMap, MemoryQueue, MemorySet,
};
use crate::commit::{CommittingMap, CommittingSet};
use crate::config::{SpillConfig, SPILL_THRESHOLD_FOR_QUEUES};
use crate::error::{Result, SpillError};
use crate::group::{
    hash_of_binding_set, BindingSetHasher, FactoryId, GroupKey, GroupKeyCodec, ValueExtractor,
};
use crate::spill::{MapSpiller, QueueSpiller, SetSpiller, SpillableMap, SpillableQueue, SpillableSet};
use crate::store::{DiskMap, DiskQueue, DiskSet, SpillStore, StoreOptions};
use crate::value::Value;

static NEXT_FACTORY: AtomicU64 = AtomicU64::new(1);

// ------------- LazyStore -------------
enum StoreState {
    Unopened,
    Open(Arc<SpillStore>),
    Closed,
}

/// The shared store, opened on first use. A failed open leaves it unopened,
/// so a later spill tries again.
struct LazyStore {
    options: StoreOptions,
    state: Mutex<StoreState>,
}

impl LazyStore {
    fn new(options: StoreOptions) -> Self {
        Self {
            options,
            state: Mutex::new(StoreState::Unopened),
        }
    }
    fn get(&self) -> Result<Arc<SpillStore>> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| SpillError::Lock(e.to_string()))?;
        match &*state {
            StoreState::Open(store) => Ok(Arc::clone(store)),
            StoreState::Closed => Err(SpillError::Closed),
            StoreState::Unopened => {
                let store = Arc::new(SpillStore::open(&self.options)?);
                *state = StoreState::Open(Arc::clone(&store));
                Ok(store)
            }
        }
    }
    fn path(&self) -> Option<PathBuf> {
        match &*self.state.lock().ok()? {
            StoreState::Open(store) => Some(store.path().to_path_buf()),
            _ => None,
        }
    }
    fn close(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| SpillError::Lock(e.to_string()))?;
        if let StoreState::Open(store) = std::mem::replace(&mut *state, StoreState::Closed) {
            store.close()?;
        }
        Ok(())
    }
}

// ------------- CollectionFactory -------------
pub struct CollectionFactory {
    id: FactoryId,
    config: SpillConfig,
    store: Arc<LazyStore>,
    next_collection: AtomicU64,
}

impl CollectionFactory {
    pub fn new(config: SpillConfig) -> Self {
        let id = NEXT_FACTORY.fetch_add(1, Ordering::Relaxed);
        debug!(
            factory = id,
            spill_threshold_for_sets = config.spill_threshold_for_sets,
            commit_interval = config.commit_interval,
            "collection factory created"
        );
        Self {
            id,
            store: Arc::new(LazyStore::new(config.store_options())),
            config,
            next_collection: AtomicU64::new(0),
        }
    }
    /// A factory that never spills.
    pub fn in_memory() -> Self {
        Self::new(SpillConfig::in_memory())
    }
    pub fn id(&self) -> FactoryId {
        self.id
    }
    pub fn config(&self) -> &SpillConfig {
        &self.config
    }
    /// Location of the disk store, once something has spilled into it.
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store.path()
    }
    fn next_name(&self) -> String {
        format!("{:x}", self.next_collection.fetch_add(1, Ordering::Relaxed))
    }
    fn set_threshold(&self) -> i64 {
        if self.config.spilling_enabled() {
            self.config.spill_threshold_for_sets
        } else {
            0
        }
    }

    // the spillers open the store lazily, on the first migration
    fn set_spiller<T: Element>(&self, codec: Arc<dyn Codec<T>>) -> SetSpiller<T> {
        let store = Arc::clone(&self.store);
        let interval = self.config.commit_interval;
        Box::new(move |name: &str| -> Result<DynSet<T>> {
            let store = store.get()?;
            let disk = DiskSet::create(Arc::clone(&store), name, Arc::clone(&codec))?;
            Ok(Box::new(CommittingSet::new(disk, store, interval)))
        })
    }
    fn map_spiller<K: Element, V: Clone + Send + 'static>(
        &self,
        key_codec: Arc<dyn Codec<K>>,
        value_codec: Arc<dyn Codec<V>>,
    ) -> MapSpiller<K, V> {
        let store = Arc::clone(&self.store);
        let interval = self.config.commit_interval;
        Box::new(move |name: &str| -> Result<DynMap<K, V>> {
            let store = store.get()?;
            let disk = DiskMap::create(
                Arc::clone(&store),
                name,
                Arc::clone(&key_codec),
                Arc::clone(&value_codec),
            )?;
            Ok(Box::new(CommittingMap::new(disk, store, interval)))
        })
    }
    fn queue_spiller<T: Clone + Send + 'static>(&self, codec: Arc<dyn Codec<T>>) -> QueueSpiller<T> {
        let store = Arc::clone(&self.store);
        let interval = self.config.commit_interval;
        Box::new(move |name: &str| -> Result<DynQueue<T>> {
            let store = store.get()?;
            let disk = DiskMap::create(
                Arc::clone(&store),
                name,
                Arc::new(I64Codec) as Arc<dyn Codec<i64>>,
                Arc::clone(&codec),
            )?;
            let positions: DynMap<i64, T> = Box::new(CommittingMap::new(disk, store, interval));
            Ok(Box::new(DiskQueue::new(positions)))
        })
    }

    fn spillable_set<T: Element>(&self, codec: Arc<dyn Codec<T>>) -> DynSet<T> {
        let threshold = self.set_threshold();
        if threshold <= 0 {
            return Box::new(MemorySet::<T>::default());
        }
        Box::new(SpillableSet::new(self.next_name(), threshold, self.set_spiller(codec)))
    }
    fn spillable_map<K: Element, V: Clone + Send + 'static>(
        &self,
        key_codec: Arc<dyn Codec<K>>,
        value_codec: Arc<dyn Codec<V>>,
    ) -> DynMap<K, V> {
        if !self.config.spilling_enabled() {
            return Box::new(MemoryMap::<K, V>::default());
        }
        Box::new(SpillableMap::new(
            self.next_name(),
            self.config.commit_interval,
            self.map_spiller(key_codec, value_codec),
        ))
    }
    fn spillable_queue<T: Clone + Send + 'static>(&self, codec: Arc<dyn Codec<T>>) -> DynQueue<T> {
        if !self.config.spilling_enabled() {
            return Box::new(MemoryQueue::<T>::new());
        }
        Box::new(SpillableQueue::new(
            self.next_name(),
            SPILL_THRESHOLD_FOR_QUEUES,
            self.queue_spiller(codec),
        ))
    }

    pub fn create_list<T>(&self) -> Vec<T> {
        Vec::new()
    }
    pub fn create_value_list(&self) -> Vec<Value> {
        Vec::new()
    }
    pub fn create_set<T: Element + Serialize + DeserializeOwned>(&self) -> DynSet<T> {
        self.spillable_set(Arc::new(SerdeCodec::<T>::new()))
    }
    pub fn create_value_set(&self) -> DynSet<Value> {
        self.spillable_set(Arc::new(ValueCodec))
    }
    pub fn create_map<K, V>(&self) -> DynMap<K, V>
    where
        K: Element + Serialize + DeserializeOwned,
        V: Clone + Send + Serialize + DeserializeOwned + 'static,
    {
        self.spillable_map(Arc::new(SerdeCodec::<K>::new()), Arc::new(SerdeCodec::<V>::new()))
    }
    pub fn create_value_keyed_map<V>(&self) -> DynMap<Value, V>
    where
        V: Clone + Send + Serialize + DeserializeOwned + 'static,
    {
        self.spillable_map(Arc::new(ValueCodec), Arc::new(SerdeCodec::<V>::new()))
    }
    pub fn create_queue<T>(&self) -> DynQueue<T>
    where
        T: Clone + Send + Serialize + DeserializeOwned + 'static,
    {
        self.spillable_queue(Arc::new(SerdeCodec::<T>::new()))
    }
    pub fn create_value_queue(&self) -> DynQueue<Value> {
        self.spillable_queue(Arc::new(ValueCodec))
    }
    /// Each set gets its own variable name registry.
    pub fn create_set_of_binding_sets(&self) -> DynSet<BindingSet> {
        self.spillable_set(Arc::new(BindingSetCodec::new()))
    }
    pub fn create_binding_set_queue(&self) -> DynQueue<BindingSet> {
        self.spillable_queue(Arc::new(BindingSetCodec::new()))
    }
    pub fn create_group_by_map<E>(&self) -> GroupByMap<E>
    where
        E: Clone + Send + Serialize + DeserializeOwned + 'static,
    {
        GroupByMap {
            origin: self.id,
            inner: self.spillable_map(
                Arc::new(GroupKeyCodec::new(self.id)),
                Arc::new(SerdeCodec::<E>::new()),
            ),
        }
    }
    /// Builds a group key from the extracted values. The key's hash is
    /// whatever `hash_fn` says it is.
    pub fn create_binding_set_key(
        &self,
        bindings: &BindingSet,
        extractors: &[ValueExtractor],
        hash_fn: &dyn Fn(&BindingSet) -> i32,
    ) -> GroupKey {
        let values = extractors.iter().map(|extract| extract(bindings)).collect();
        GroupKey::new(values, hash_fn(bindings), self.id)
    }
    /// The default `hash_fn` for [`Self::create_binding_set_key`].
    pub fn hash_of_binding_set_function(&self, extractors: Vec<ValueExtractor>) -> BindingSetHasher {
        Arc::new(move |bindings: &BindingSet| hash_of_binding_set(bindings, &extractors))
    }

    /// Closes the disk store, if anything ever spilled. Calling it again is
    /// harmless.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

impl Drop for CollectionFactory {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(factory = self.id, error = %e, "spill store did not close cleanly");
        }
    }
}

// ------------- GroupByMap -------------
/// Group-by accumulators keyed by [`GroupKey`]. Keys made by another factory
/// are refused before they reach the store.
pub struct GroupByMap<E: Clone + Send + 'static> {
    origin: FactoryId,
    inner: DynMap<GroupKey, E>,
}

impl<E: Clone + Send + 'static> GroupByMap<E> {
    fn check(&self, key: &GroupKey) -> Result<()> {
        if key.origin() != self.origin {
            return Err(SpillError::TypeMismatch(format!(
                "group key from factory {} used with factory {}",
                key.origin(),
                self.origin
            )));
        }
        Ok(())
    }
}

impl<E: Clone + Send + 'static> MapLike<GroupKey, E> for GroupByMap<E> {
    fn insert(&mut self, key: GroupKey, value: E) -> Result<Option<E>> {
        self.check(&key)?;
        self.inner.insert(key, value)
    }
    fn insert_all(&mut self, entries: Vec<(GroupKey, E)>) -> Result<()> {
        for (key, _) in &entries {
            self.check(key)?;
        }
        self.inner.insert_all(entries)
    }
    fn get(&self, key: &GroupKey) -> Result<Option<E>> {
        self.check(key)?;
        self.inner.get(key)
    }
    fn remove(&mut self, key: &GroupKey) -> Result<Option<E>> {
        self.check(key)?;
        self.inner.remove(key)
    }
    fn contains_key(&self, key: &GroupKey) -> Result<bool> {
        self.check(key)?;
        self.inner.contains_key(key)
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
    fn clear(&mut self) -> Result<()> {
        self.inner.clear()
    }
    fn iter(&self) -> Entries<'_, (GroupKey, E)> {
        self.inner.iter()
    }
    fn is_spilled(&self) -> bool {
        self.inner.is_spilled()
    }
}

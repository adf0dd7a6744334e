// used to keep the one-to-one mapping between variable names and their indexes
use bimap::BiMap;

use serde::{Deserialize, Serialize};
use std::collections::btree_map::{BTreeMap, Iter};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::codec::{write_bool, write_varint, ByteReader, Codec, ValueCodec};
use crate::error::CodecError;
use crate::value::Value;

// ------------- BindingSet -------------
/// One result row. Names are kept sorted so that equality and hashing do not
/// depend on the order in which bindings were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingSet {
    bindings: BTreeMap<String, Value>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }
    pub fn with<S: Into<String>>(mut self, name: S, value: Value) -> Self {
        self.insert(name, value);
        self
    }
    pub fn insert<S: Into<String>>(&mut self, name: S, value: Value) -> Option<Value> {
        self.bindings.insert(name.into(), value)
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
    /// The bound value, or `Null` when the name is unbound.
    pub fn value(&self, name: &str) -> Value {
        self.bindings.get(name).cloned().unwrap_or_default()
    }
    pub fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
    pub fn iter(&self) -> Iter<'_, String, Value> {
        self.bindings.iter()
    }
    pub fn len(&self) -> usize {
        self.bindings.len()
    }
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
impl fmt::Display for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        for (name, value) in self.iter() {
            s += &format!("{}={},", name, value);
        }
        s.pop();
        write!(f, "[{}]", s)
    }
}

// ------------- NameRegistry -------------
/// Append-only table of variable names. Once a name has an index, that index
/// never changes, so records encoded against a narrower registry remain
/// readable after more names have been appended.
#[derive(Debug, Default)]
pub struct NameRegistry {
    kept: BiMap<String, usize>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self { kept: BiMap::new() }
    }
    pub fn append_if_absent(&mut self, name: &str) -> usize {
        if let Some(index) = self.kept.get_by_left(name) {
            return *index;
        }
        let index = self.kept.len();
        self.kept.insert(name.to_string(), index);
        index
    }
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.kept.get_by_left(name).copied()
    }
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.kept.get_by_right(&index).map(String::as_str)
    }
    /// Names in index order.
    pub fn names(&self) -> Vec<&str> {
        (0..self.kept.len()).filter_map(|i| self.name_at(i)).collect()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

// ------------- BindingSetCodec -------------
/// Encodes binding sets against a registry shared by one encoding session.
///
/// A record is a run of `true, index, value` entries, one per bound name in
/// registry order, closed by a single `false`.
#[derive(Debug, Clone, Default)]
pub struct BindingSetCodec {
    registry: Arc<Mutex<NameRegistry>>,
    values: ValueCodec,
}

impl BindingSetCodec {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(Mutex::new(NameRegistry::new())))
    }
    pub fn with_registry(registry: Arc<Mutex<NameRegistry>>) -> Self {
        Self {
            registry,
            values: ValueCodec,
        }
    }
    pub fn registry(&self) -> Arc<Mutex<NameRegistry>> {
        Arc::clone(&self.registry)
    }
}

impl Codec<BindingSet> for BindingSetCodec {
    fn encode(&self, bindings: &BindingSet, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut registry = self
            .registry
            .lock()
            .map_err(|e| CodecError::Lock(e.to_string()))?;
        for name in bindings.names() {
            registry.append_if_absent(name);
        }
        for index in 0..registry.len() {
            let name = registry
                .name_at(index)
                .ok_or(CodecError::UnknownTag(index as u64))?;
            if let Some(value) = bindings.get(name) {
                write_bool(true, out);
                write_varint(index as u64, out);
                self.values.encode(value, out)?;
            }
        }
        write_bool(false, out);
        Ok(())
    }
    fn decode(&self, input: &mut ByteReader<'_>) -> Result<BindingSet, CodecError> {
        let registry = self
            .registry
            .lock()
            .map_err(|e| CodecError::Lock(e.to_string()))?;
        let mut bindings = BindingSet::new();
        while input.read_bool()? {
            let index = input.read_varint()?;
            let name = usize::try_from(index)
                .ok()
                .and_then(|i| registry.name_at(i))
                .ok_or(CodecError::UnknownTag(index))?;
            bindings.insert(name, self.values.decode(input)?);
        }
        Ok(bindings)
    }
}

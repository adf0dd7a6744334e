use std::hash::{Hash, Hasher};
use std::sync::Arc;

use seahash::SeaHasher;

use crate::binding::BindingSet;
use crate::codec::{write_signed, write_varint, ByteReader, Codec, ValueCodec};
use crate::error::CodecError;
use crate::value::Value;

/// Identifies the factory that produced a key.
pub type FactoryId = u64;

/// Pulls one grouping column out of a binding set.
pub type ValueExtractor = Arc<dyn Fn(&BindingSet) -> Value + Send + Sync>;

/// Computes the trusted hash of a group key from the row it came from.
pub type BindingSetHasher = Arc<dyn Fn(&BindingSet) -> i32 + Send + Sync>;

/// Extractor for a single variable, yielding `Null` when it is unbound.
pub fn extract(name: &str) -> ValueExtractor {
    let name = name.to_string();
    Arc::new(move |bindings: &BindingSet| bindings.value(&name))
}

/// Hashes the grouping columns of a binding set, the way group keys expect
/// their `hash` to be computed.
pub fn hash_of_binding_set(bindings: &BindingSet, extractors: &[ValueExtractor]) -> i32 {
    let mut hasher = SeaHasher::default();
    for extractor in extractors {
        extractor(bindings).hash(&mut hasher);
    }
    hasher.finish() as i32
}

// ------------- GroupKey -------------
/// Key of one GROUP BY bucket. The hash is supplied by whoever builds the key
/// and is never recomputed from the values.
#[derive(Debug, Clone)]
pub struct GroupKey {
    values: Vec<Value>,
    hash: i32,
    origin: FactoryId,
}

impl GroupKey {
    pub fn new(values: Vec<Value>, hash: i32, origin: FactoryId) -> Self {
        Self {
            values,
            hash,
            origin,
        }
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn hash_code(&self) -> i32 {
        self.hash
    }
    pub fn origin(&self) -> FactoryId {
        self.origin
    }
}
impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.values == other.values
    }
}
impl Eq for GroupKey {}
impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash);
    }
}

// ------------- GroupKeyCodec -------------
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupKeyCodec {
    origin: FactoryId,
    values: ValueCodec,
}

impl GroupKeyCodec {
    /// Decoded keys are tagged with `origin`.
    pub fn new(origin: FactoryId) -> Self {
        Self {
            origin,
            values: ValueCodec,
        }
    }
}

impl Codec<GroupKey> for GroupKeyCodec {
    fn encode(&self, key: &GroupKey, out: &mut Vec<u8>) -> Result<(), CodecError> {
        write_signed(key.hash as i64, out);
        write_varint(key.values.len() as u64, out);
        for value in &key.values {
            self.values.encode(value, out)?;
        }
        Ok(())
    }
    fn decode(&self, input: &mut ByteReader<'_>) -> Result<GroupKey, CodecError> {
        let hash = input.read_signed()?;
        let hash = i32::try_from(hash)
            .map_err(|_| CodecError::Malformed(format!("group hash {}", hash)))?;
        let len = input.read_len()?;
        // every value takes at least one byte
        if len > input.remaining() {
            return Err(CodecError::Truncated);
        }
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.values.decode(input)?);
        }
        Ok(GroupKey::new(values, hash, self.origin))
    }
}

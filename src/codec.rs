//! Compact, self-delimiting byte encodings for everything that can be spilled.
//!
//! Integers are LEB128 varints (signed ones zigzag-mapped first) and strings
//! are a varint byte length followed by UTF-8. A [`Value`] is a varint tag
//! followed by its payload:
//!
//! ```text
//! 0 BlankNode  label
//! 1 Iri        iri
//! 2 Literal    0 LanguageTagged     label, language
//!              1 OtherDatatype      datatype iri, label
//!              2 WellKnownXSD       ordinal, label
//!              3 WellKnownGEO       ordinal, label
//!              4 WellKnownRDF       ordinal, label
//!              5 ExtendedWellKnown  datatype iri, label
//! 3 Triple     subject, predicate, object
//! 4 Null
//! ```
//!
//! Equal values always produce identical bytes, which the disk store relies
//! on when it uses encoded bytes as the identity of set members and map keys.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CodecError;
use crate::value::{Datatype, Geo, LiteralKind, RdfBuiltin, Value, Xsd};

// ------------- Primitives -------------
pub fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Maps 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, ...
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

pub fn write_signed(value: i64, out: &mut Vec<u8>) {
    write_varint(zigzag_encode(value), out);
}

pub fn write_bool(value: bool, out: &mut Vec<u8>) {
    out.push(value as u8);
}

pub fn write_str(value: &str, out: &mut Vec<u8>) {
    write_varint(value.len() as u64, out);
    out.extend_from_slice(value.as_bytes());
}

/// Cursor over an encoded byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
    pub fn position(&self) -> usize {
        self.pos
    }
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
    pub fn read_byte(&mut self) -> Result<u8, CodecError> {
        let byte = *self.buf.get(self.pos).ok_or(CodecError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if len > self.remaining() {
            return Err(CodecError::Truncated);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let byte = self.read_byte()?;
            let payload = (byte & 0x7F) as u64;
            if shift > 63 || (shift == 63 && payload > 1) {
                return Err(CodecError::Malformed("varint overflow".into()));
            }
            result |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }
    pub fn read_signed(&mut self) -> Result<i64, CodecError> {
        Ok(zigzag_decode(self.read_varint()?))
    }
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::Malformed(format!("boolean byte {}", other))),
        }
    }
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_varint()?;
        usize::try_from(len).map_err(|_| CodecError::Malformed(format!("length {}", len)))
    }
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::Malformed(e.to_string()))
    }
}

// ------------- Codec -------------
/// A byte encoding for one element type. Implementations must be
/// self-delimiting, and equal elements must encode to equal bytes.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, item: &T, out: &mut Vec<u8>) -> Result<(), CodecError>;
    fn decode(&self, input: &mut ByteReader<'_>) -> Result<T, CodecError>;
}

pub fn encode_to_vec<T, C: Codec<T> + ?Sized>(codec: &C, item: &T) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    codec.encode(item, &mut out)?;
    Ok(out)
}

/// Decodes exactly one element; bytes left over after it are an error.
pub fn decode_from_slice<T, C: Codec<T> + ?Sized>(codec: &C, bytes: &[u8]) -> Result<T, CodecError> {
    let mut input = ByteReader::new(bytes);
    let item = codec.decode(&mut input)?;
    if !input.is_exhausted() {
        return Err(CodecError::Malformed(format!(
            "{} trailing bytes",
            input.remaining()
        )));
    }
    Ok(item)
}

const TAG_BLANK_NODE: u64 = 0;
const TAG_IRI: u64 = 1;
const TAG_LITERAL: u64 = 2;
const TAG_TRIPLE: u64 = 3;
const TAG_NULL: u64 = 4;

/// Triples nested deeper than this are refused when decoding.
pub const MAX_TRIPLE_DEPTH: usize = 128;

const LITERAL_LANGUAGE: u64 = 0;
const LITERAL_OTHER: u64 = 1;
const LITERAL_XSD: u64 = 2;
const LITERAL_GEO: u64 = 3;
const LITERAL_RDF: u64 = 4;
const LITERAL_EXTENDED: u64 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCodec;

impl ValueCodec {
    pub fn new() -> Self {
        Self
    }
    fn encode_literal(label: &str, kind: &LiteralKind, out: &mut Vec<u8>) {
        match kind {
            LiteralKind::Language(lang) => {
                write_varint(LITERAL_LANGUAGE, out);
                write_str(label, out);
                write_str(lang, out);
            }
            LiteralKind::Typed(Datatype::Other(iri)) => {
                write_varint(LITERAL_OTHER, out);
                write_str(iri, out);
                write_str(label, out);
            }
            LiteralKind::Typed(Datatype::Xsd(xsd)) => {
                write_varint(LITERAL_XSD, out);
                write_varint(xsd.ordinal() as u64, out);
                write_str(label, out);
            }
            LiteralKind::Typed(Datatype::Geo(geo)) => {
                write_varint(LITERAL_GEO, out);
                write_varint(geo.ordinal() as u64, out);
                write_str(label, out);
            }
            LiteralKind::Typed(Datatype::Rdf(rdf)) => {
                write_varint(LITERAL_RDF, out);
                write_varint(rdf.ordinal() as u64, out);
                write_str(label, out);
            }
            LiteralKind::Typed(Datatype::ExtendedWellKnown(iri)) => {
                write_varint(LITERAL_EXTENDED, out);
                write_str(iri, out);
                write_str(label, out);
            }
        }
    }
    fn decode_literal(input: &mut ByteReader<'_>) -> Result<Value, CodecError> {
        let sub_tag = input.read_varint()?;
        let (label, kind) = match sub_tag {
            LITERAL_LANGUAGE => {
                let label = input.read_string()?;
                (label, LiteralKind::Language(input.read_string()?))
            }
            LITERAL_OTHER => {
                let iri = input.read_string()?;
                (input.read_string()?, LiteralKind::Typed(Datatype::from_iri(&iri)))
            }
            LITERAL_XSD => {
                let ordinal = input.read_varint()?;
                let xsd = ordinal_of(ordinal, Xsd::from_ordinal)?;
                (input.read_string()?, LiteralKind::Typed(Datatype::Xsd(xsd)))
            }
            LITERAL_GEO => {
                let ordinal = input.read_varint()?;
                let geo = ordinal_of(ordinal, Geo::from_ordinal)?;
                (input.read_string()?, LiteralKind::Typed(Datatype::Geo(geo)))
            }
            LITERAL_RDF => {
                let ordinal = input.read_varint()?;
                let rdf = ordinal_of(ordinal, RdfBuiltin::from_ordinal)?;
                (input.read_string()?, LiteralKind::Typed(Datatype::Rdf(rdf)))
            }
            LITERAL_EXTENDED => {
                let iri = input.read_string()?;
                (
                    input.read_string()?,
                    LiteralKind::Typed(Datatype::ExtendedWellKnown(iri)),
                )
            }
            unknown => return Err(CodecError::UnknownTag(unknown)),
        };
        Ok(Value::Literal { label, kind })
    }
}

fn ordinal_of<D>(ordinal: u64, lookup: fn(u32) -> Option<D>) -> Result<D, CodecError> {
    u32::try_from(ordinal)
        .ok()
        .and_then(lookup)
        .ok_or(CodecError::UnknownTag(ordinal))
}

impl Codec<Value> for ValueCodec {
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match value {
            Value::BlankNode(label) => {
                write_varint(TAG_BLANK_NODE, out);
                write_str(label, out);
            }
            Value::Iri(iri) => {
                write_varint(TAG_IRI, out);
                write_str(iri, out);
            }
            Value::Literal { label, kind } => {
                write_varint(TAG_LITERAL, out);
                Self::encode_literal(label, kind, out);
            }
            Value::Triple(subject, predicate, object) => {
                write_varint(TAG_TRIPLE, out);
                self.encode(subject, out)?;
                self.encode(predicate, out)?;
                self.encode(object, out)?;
            }
            Value::Null => write_varint(TAG_NULL, out),
        }
        Ok(())
    }
    fn decode(&self, input: &mut ByteReader<'_>) -> Result<Value, CodecError> {
        Self::decode_at(input, 0)
    }
}

impl ValueCodec {
    fn decode_at(input: &mut ByteReader<'_>, depth: usize) -> Result<Value, CodecError> {
        match input.read_varint()? {
            TAG_BLANK_NODE => Ok(Value::BlankNode(input.read_string()?)),
            TAG_IRI => Ok(Value::Iri(input.read_string()?)),
            TAG_LITERAL => Self::decode_literal(input),
            TAG_TRIPLE => {
                if depth >= MAX_TRIPLE_DEPTH {
                    return Err(CodecError::Malformed("triple nesting too deep".into()));
                }
                let subject = Self::decode_at(input, depth + 1)?;
                let predicate = Self::decode_at(input, depth + 1)?;
                let object = Self::decode_at(input, depth + 1)?;
                Ok(Value::triple(subject, predicate, object))
            }
            TAG_NULL => Ok(Value::Null),
            unknown => Err(CodecError::UnknownTag(unknown)),
        }
    }
}

/// Queue positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64Codec;

impl Codec<i64> for I64Codec {
    fn encode(&self, item: &i64, out: &mut Vec<u8>) -> Result<(), CodecError> {
        write_signed(*item, out);
        Ok(())
    }
    fn decode(&self, input: &mut ByteReader<'_>) -> Result<i64, CodecError> {
        input.read_signed()
    }
}

/// Fallback for element types without a dedicated encoding: a length
/// prefixed JSON document. Only suitable for types whose serialization is
/// deterministic (no `HashMap` fields), since bytes stand in for equality.
pub struct SerdeCodec<T> {
    marker: PhantomData<fn() -> T>,
}

impl<T> SerdeCodec<T> {
    pub fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}
impl<T> Default for SerdeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for SerdeCodec<T> {
    fn encode(&self, item: &T, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let document = serde_json::to_vec(item)?;
        write_varint(document.len() as u64, out);
        out.extend_from_slice(&document);
        Ok(())
    }
    fn decode(&self, input: &mut ByteReader<'_>) -> Result<T, CodecError> {
        let len = input.read_len()?;
        Ok(serde_json::from_slice(input.read_bytes(len)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_varint(val: u64) {
        let mut buf = Vec::new();
        write_varint(val, &mut buf);
        let mut input = ByteReader::new(&buf);
        assert_eq!(input.read_varint().unwrap(), val);
        assert!(input.is_exhausted());
    }

    #[test]
    fn varint_boundaries() {
        for val in [0, 1, 127, 128, 255, 16_384, u32::MAX as u64, u64::MAX] {
            round_trip_varint(val);
        }
        let mut buf = Vec::new();
        write_varint(127, &mut buf);
        assert_eq!(buf.len(), 1);
        write_varint(128, &mut buf);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn zigzag_maps_small_magnitudes_to_small_codes() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        for val in [i64::MIN, -100, 0, 100, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(val)), val);
        }
    }

    #[test]
    fn empty_input_is_truncated() {
        assert_eq!(ByteReader::new(&[]).read_varint(), Err(CodecError::Truncated));
        assert_eq!(ByteReader::new(&[0x80]).read_varint(), Err(CodecError::Truncated));
    }

    #[test]
    fn oversized_varint_is_malformed() {
        let buf = [0xFF; 11];
        assert!(matches!(
            ByteReader::new(&buf).read_varint(),
            Err(CodecError::Malformed(_))
        ));
        // overlong, all zero payloads
        let mut buf = vec![0x80; 10];
        buf.push(0x00);
        assert!(matches!(
            ByteReader::new(&buf).read_varint(),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            decode_from_slice(&ValueCodec, &buf),
            Err(CodecError::Malformed(_))
        ));
        // the largest value still fits
        let mut buf = Vec::new();
        write_varint(u64::MAX, &mut buf);
        assert_eq!(ByteReader::new(&buf).read_varint(), Ok(u64::MAX));
    }

    #[test]
    fn plain_literal_is_compact() {
        let bytes = encode_to_vec(&ValueCodec, &Value::literal("a")).unwrap();
        // tag, sub-tag, ordinal, length, label
        assert_eq!(bytes.len(), 5);
    }
}

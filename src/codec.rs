//! Encode/decode resolved trees to the compact binary form.
//!
//! Layout (fixed-width fields use the byte order named in the header flags;
//! "varint" is a compressed int: 7 bits per byte, least significant group
//! first, high bit set on every byte but the last, at most 5 bytes):
//!
//! ```text
//! header        magic "CFGB" | flags u8 (bit 0: big-endian) | version u16
//! string_table  count varint | { len varint, utf-8 bytes }*
//! root record   class_record of the document scope (empty name)
//! footer        checksum u32 = wrapping sum of all preceding bytes
//!
//! class_record  name varint | base varint (0 = none, else index + 1) |
//!               base_state u8 | entry_count varint | property_entry*
//! property_entry name varint | tag u8 | payload
//! ```
//!
//! Tags follow the engine's binarized value ids: 0 string (varint index),
//! 1 float (f32), 2 int (i32), 3 array (count varint, then tag + payload per
//! element), 4 sub-class (u32 byte length, then class_record), 5 delete (no
//! payload; a pending delete of a class whose base is unresolved).
//!
//! Base states are 1 local, 2 external, 3 missing, 4 cyclic, 5 partial
//! (local, but that class's own base chain is unresolved).
//!
//! The string pool is deduplicated and ordered by first use while writing, so
//! encoding a decoded tree reproduces the original bytes.

use crate::resolve::{BaseRef, BaseState, ResolvedClass, ResolvedTree};
use crate::value::{Property, Value};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use indexmap::IndexSet;
use tracing::{debug, trace};

pub const MAGIC: [u8; 4] = *b"CFGB";
pub const FORMAT_VERSION: u16 = 1;
const FLAG_BIG_ENDIAN: u8 = 0x01;
pub(crate) const HEADER_LEN: usize = 7;
const CHECKSUM_LEN: usize = 4;
/// Deepest class/array nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecErrorKind {
    #[error("unexpected end of data")]
    Truncated,
    #[error("bad magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("unknown header flags {0:#04x}")]
    UnknownFlags(u8),
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown type tag {0}")]
    UnknownTypeTag(u8),
    #[error("string index {index} out of range (pool has {len})")]
    StringIndexOutOfRange { index: u32, len: usize },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid base reference (index {index}, state {state})")]
    InvalidBaseState { index: u32, state: u8 },
    #[error("sub-class length prefix {declared} does not match record length {actual}")]
    LengthMismatch { declared: u32, actual: usize },
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("{0} trailing bytes after root record")]
    TrailingBytes(usize),
    #[error("compressed integer longer than 5 bytes")]
    VarIntOverflow,
    #[error("nesting deeper than {0}")]
    NestingTooDeep(usize),
    #[error("{0} exceeds the format's 32-bit limit")]
    TooLarge(&'static str),
    #[error("unknown raP entry type {0}")]
    UnknownEntryType(u8),
    #[error("class body offset {0} is outside the buffer")]
    OffsetOutOfRange(u32),
    #[error("string contains a NUL byte")]
    NulInString,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("codec error at offset {offset}: {kind}")]
pub struct CodecError {
    pub offset: usize,
    pub kind: CodecErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TypeTag {
    String = 0,
    Float = 1,
    Int = 2,
    Array = 3,
    SubClass = 4,
    Delete = 5,
}

impl TypeTag {
    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => TypeTag::String,
            1 => TypeTag::Float,
            2 => TypeTag::Int,
            3 => TypeTag::Array,
            4 => TypeTag::SubClass,
            5 => TypeTag::Delete,
            _ => return None,
        })
    }
}

fn base_state_byte(state: BaseState) -> u8 {
    match state {
        BaseState::Local => 1,
        BaseState::External => 2,
        BaseState::Missing => 3,
        BaseState::Cyclic => 4,
        BaseState::Partial => 5,
    }
}

fn base_state_from_byte(b: u8) -> Option<BaseState> {
    Some(match b {
        1 => BaseState::Local,
        2 => BaseState::External,
        3 => BaseState::Missing,
        4 => BaseState::Cyclic,
        5 => BaseState::Partial,
        _ => return None,
    })
}

pub(crate) fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    pub endianness: Endianness,
}

/// Encode with the default codec (little-endian).
pub fn encode(tree: &ResolvedTree) -> Result<Vec<u8>, CodecError> {
    Codec::default().encode(tree)
}

/// Decode; byte order is taken from the header.
pub fn decode(bytes: &[u8]) -> Result<ResolvedTree, CodecError> {
    Codec::default().decode(bytes)
}

impl Codec {
    pub fn new(endianness: Endianness) -> Self {
        Codec { endianness }
    }

    pub fn encode(&self, tree: &ResolvedTree) -> Result<Vec<u8>, CodecError> {
        let mut encoder = Encoder { order: self.endianness, pool: IndexSet::new() };
        let mut body = Vec::new();
        encoder.write_record(&mut body, &tree.root)?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len() + CHECKSUM_LEN);
        out.extend_from_slice(&MAGIC);
        out.push(match self.endianness {
            Endianness::Little => 0,
            Endianness::Big => FLAG_BIG_ENDIAN,
        });
        put_u16(&mut out, self.endianness, FORMAT_VERSION);
        put_varint(&mut out, len_u32(encoder.pool.len(), "string count", 0)?);
        for s in &encoder.pool {
            let len = len_u32(s.len(), "string length", out.len())?;
            put_varint(&mut out, len);
            out.extend_from_slice(s.as_bytes());
        }
        out.extend_from_slice(&body);
        let sum = checksum(&out);
        put_u32(&mut out, self.endianness, sum);
        debug!(bytes = out.len(), strings = encoder.pool.len(), "encoded config");
        Ok(out)
    }

    /// Decode a whole buffer. `self.endianness` is not consulted; the header decides.
    pub fn decode(&self, bytes: &[u8]) -> Result<ResolvedTree, CodecError> {
        let (mut reader, strings) = open(bytes)?;
        let root = read_record(&mut reader, &strings, 0)?;
        if reader.remaining() != 0 {
            return Err(reader.error(CodecErrorKind::TrailingBytes(reader.remaining())));
        }
        debug!(bytes = bytes.len(), strings = strings.len(), "decoded config");
        Ok(ResolvedTree { root })
    }
}

fn len_u32(n: usize, what: &'static str, offset: usize) -> Result<u32, CodecError> {
    u32::try_from(n).map_err(|_| CodecError { offset, kind: CodecErrorKind::TooLarge(what) })
}

struct Encoder {
    order: Endianness,
    pool: IndexSet<String>,
}

impl Encoder {
    fn intern(&mut self, s: &str) -> Result<u32, CodecError> {
        let index = match self.pool.get_index_of(s) {
            Some(i) => i,
            None => self.pool.insert_full(s.to_string()).0,
        };
        len_u32(index, "string pool", 0)
    }

    fn write_record(&mut self, out: &mut Vec<u8>, class: &ResolvedClass) -> Result<(), CodecError> {
        let name = self.intern(&class.name)?;
        put_varint(out, name);
        match &class.base {
            Some(base) => {
                let index = self.intern(&base.name)?;
                put_varint(out, index + 1);
                out.push(base_state_byte(base.state));
            }
            None => {
                put_varint(out, 0);
                out.push(0);
            }
        }
        let count = len_u32(
            class.properties.len() + class.pending_deletes.len(),
            "entry count",
            out.len(),
        )?;
        put_varint(out, count);
        for (name, prop) in &class.properties {
            let name = self.intern(name)?;
            put_varint(out, name);
            match prop {
                Property::Value(value) => self.write_value(out, value)?,
                Property::Class(nested) => {
                    out.push(TypeTag::SubClass as u8);
                    let mut record = Vec::new();
                    self.write_record(&mut record, nested)?;
                    let len = len_u32(record.len(), "sub-class record", out.len())?;
                    put_u32(out, self.order, len);
                    out.extend_from_slice(&record);
                }
            }
        }
        for name in &class.pending_deletes {
            let name = self.intern(name)?;
            put_varint(out, name);
            out.push(TypeTag::Delete as u8);
        }
        Ok(())
    }

    fn write_value(&mut self, out: &mut Vec<u8>, value: &Value) -> Result<(), CodecError> {
        match value {
            Value::String(s) => {
                out.push(TypeTag::String as u8);
                let index = self.intern(s)?;
                put_varint(out, index);
            }
            Value::Float(x) => {
                out.push(TypeTag::Float as u8);
                put_u32(out, self.order, x.to_bits());
            }
            Value::Int(x) => {
                out.push(TypeTag::Int as u8);
                put_u32(out, self.order, *x as u32);
            }
            Value::Array(elements) => {
                out.push(TypeTag::Array as u8);
                let len = len_u32(elements.len(), "array length", out.len())?;
                put_varint(out, len);
                for element in elements {
                    self.write_value(out, element)?;
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn put_varint(out: &mut Vec<u8>, mut v: u32) {
    loop {
        let low = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(low);
            return;
        }
        out.push(low | 0x80);
    }
}

fn put_u16(out: &mut Vec<u8>, order: Endianness, v: u16) {
    let mut buf = [0u8; 2];
    match order {
        Endianness::Little => LittleEndian::write_u16(&mut buf, v),
        Endianness::Big => BigEndian::write_u16(&mut buf, v),
    }
    out.extend_from_slice(&buf);
}

pub(crate) fn put_u32(out: &mut Vec<u8>, order: Endianness, v: u32) {
    let mut buf = [0u8; 4];
    match order {
        Endianness::Little => LittleEndian::write_u32(&mut buf, v),
        Endianness::Big => BigEndian::write_u32(&mut buf, v),
    }
    out.extend_from_slice(&buf);
}

/// Bounds-checked cursor over the body of an encoded buffer (checksum excluded).
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    order: Endianness,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8], order: Endianness) -> Self {
        Reader { bytes, pos: 0, order }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub(crate) fn error(&self, kind: CodecErrorKind) -> CodecError {
        CodecError { offset: self.pos, kind }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(self.error(CodecErrorKind::Truncated));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let buf = self.take(2)?;
        Ok(match self.order {
            Endianness::Little => LittleEndian::read_u16(buf),
            Endianness::Big => BigEndian::read_u16(buf),
        })
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        let buf = self.take(4)?;
        Ok(match self.order {
            Endianness::Little => LittleEndian::read_u32(buf),
            Endianness::Big => BigEndian::read_u32(buf),
        })
    }

    pub(crate) fn varint(&mut self) -> Result<u32, CodecError> {
        let start = self.pos;
        let mut value = 0u32;
        for i in 0..5 {
            let byte = self.u8()?;
            let part = u32::from(byte & 0x7f);
            if i == 4 && part > 0x0f {
                break;
            }
            value |= part << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError { offset: start, kind: CodecErrorKind::VarIntOverflow })
    }

    /// Zero-terminated UTF-8 string; the terminator is consumed.
    pub(crate) fn zstring(&mut self) -> Result<&'a str, CodecError> {
        let start = self.pos;
        let rest = self.bytes.get(start..).unwrap_or_default();
        let len = rest.iter().position(|&b| b == 0).ok_or(CodecError {
            offset: self.bytes.len(),
            kind: CodecErrorKind::Truncated,
        })?;
        let raw = self.take(len)?;
        self.pos += 1;
        std::str::from_utf8(raw)
            .map_err(|_| CodecError { offset: start, kind: CodecErrorKind::InvalidUtf8 })
    }

    /// Read a string-pool index and return the pooled string.
    pub(crate) fn string<'s>(&mut self, strings: &[&'s str]) -> Result<&'s str, CodecError> {
        let start = self.pos;
        let index = self.varint()?;
        strings.get(index as usize).copied().ok_or(CodecError {
            offset: start,
            kind: CodecErrorKind::StringIndexOutOfRange { index, len: strings.len() },
        })
    }

    pub(crate) fn tag(&mut self) -> Result<TypeTag, CodecError> {
        let start = self.pos;
        let byte = self.u8()?;
        TypeTag::from_byte(byte)
            .ok_or(CodecError { offset: start, kind: CodecErrorKind::UnknownTypeTag(byte) })
    }
}

/// Validate header and checksum, read the string table, and return a reader
/// positioned at the root record.
pub(crate) fn open(bytes: &[u8]) -> Result<(Reader<'_>, Vec<&str>), CodecError> {
    let truncated = CodecError { offset: bytes.len(), kind: CodecErrorKind::Truncated };
    if bytes.len() < MAGIC.len() {
        return Err(truncated);
    }
    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != MAGIC {
        return Err(CodecError { offset: 0, kind: CodecErrorKind::BadMagic(magic) });
    }
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(truncated);
    }
    let flags = bytes[4];
    let order = match flags {
        0 => Endianness::Little,
        FLAG_BIG_ENDIAN => Endianness::Big,
        other => return Err(CodecError { offset: 4, kind: CodecErrorKind::UnknownFlags(other) }),
    };
    let body_end = bytes.len() - CHECKSUM_LEN;
    let mut reader = Reader { bytes: &bytes[..body_end], pos: 5, order };
    let version = reader.u16()?;
    if version != FORMAT_VERSION {
        return Err(CodecError { offset: 5, kind: CodecErrorKind::UnsupportedVersion(version) });
    }

    let mut footer = Reader { bytes, pos: body_end, order };
    let stored = footer.u32()?;
    let computed = checksum(&bytes[..body_end]);
    if stored != computed {
        return Err(CodecError {
            offset: body_end,
            kind: CodecErrorKind::ChecksumMismatch { stored, computed },
        });
    }

    let count = reader.varint()?;
    let mut strings = Vec::new();
    for _ in 0..count {
        let len = reader.varint()? as usize;
        let start = reader.position();
        let raw = reader.take(len)?;
        let s = std::str::from_utf8(raw)
            .map_err(|_| CodecError { offset: start, kind: CodecErrorKind::InvalidUtf8 })?;
        strings.push(s);
    }
    Ok((reader, strings))
}

pub(crate) fn read_record(
    r: &mut Reader<'_>,
    strings: &[&str],
    depth: usize,
) -> Result<ResolvedClass, CodecError> {
    if depth > MAX_DEPTH {
        return Err(r.error(CodecErrorKind::NestingTooDeep(MAX_DEPTH)));
    }
    let start = r.position();
    let name = r.string(strings)?.to_string();
    let base_offset = r.position();
    let base_index = r.varint()?;
    let state = r.u8()?;
    let base = match (base_index, state) {
        (0, 0) => None,
        (0, state) => {
            return Err(CodecError {
                offset: base_offset,
                kind: CodecErrorKind::InvalidBaseState { index: 0, state },
            })
        }
        (index, state) => {
            let base_name = strings.get(index as usize - 1).copied().ok_or(CodecError {
                offset: base_offset,
                kind: CodecErrorKind::StringIndexOutOfRange { index: index - 1, len: strings.len() },
            })?;
            let state = base_state_from_byte(state).ok_or(CodecError {
                offset: base_offset,
                kind: CodecErrorKind::InvalidBaseState { index, state },
            })?;
            Some(BaseRef { name: base_name.to_string(), state })
        }
    };
    let count = r.varint()?;
    let mut class = ResolvedClass { name, base, ..Default::default() };
    for _ in 0..count {
        let entry_name = r.string(strings)?.to_string();
        match r.tag()? {
            TypeTag::Delete => class.pending_deletes.push(entry_name),
            TypeTag::SubClass => {
                let declared = r.u32()?;
                let nested_start = r.position();
                let nested = read_record(r, strings, depth + 1)?;
                let actual = r.position() - nested_start;
                if actual != declared as usize {
                    return Err(CodecError {
                        offset: nested_start,
                        kind: CodecErrorKind::LengthMismatch { declared, actual },
                    });
                }
                class.properties.insert(entry_name, Property::Class(nested));
            }
            tag => {
                let value = read_payload(r, tag, strings, depth + 1)?;
                class.properties.insert(entry_name, Property::Value(value));
            }
        }
    }
    trace!(class = %class.name, offset = start, entries = count, "decoded record");
    Ok(class)
}

fn read_payload(
    r: &mut Reader<'_>,
    tag: TypeTag,
    strings: &[&str],
    depth: usize,
) -> Result<Value, CodecError> {
    Ok(match tag {
        TypeTag::String => Value::String(r.string(strings)?.to_string()),
        TypeTag::Float => Value::Float(f32::from_bits(r.u32()?)),
        TypeTag::Int => Value::Int(r.u32()? as i32),
        TypeTag::Array => {
            if depth > MAX_DEPTH {
                return Err(r.error(CodecErrorKind::NestingTooDeep(MAX_DEPTH)));
            }
            let count = r.varint()?;
            let mut elements = Vec::new();
            for _ in 0..count {
                let tag = r.tag()?;
                elements.push(read_payload(r, tag, strings, depth + 1)?);
            }
            Value::Array(elements)
        }
        TypeTag::SubClass | TypeTag::Delete => {
            let offset = r.position().saturating_sub(1);
            return Err(CodecError { offset, kind: CodecErrorKind::UnknownTypeTag(tag as u8) });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint_bytes(v: u32) -> Vec<u8> {
        let mut out = Vec::new();
        put_varint(&mut out, v);
        out
    }

    #[test]
    fn varint_layout() {
        assert_eq!(varint_bytes(0), vec![0x00]);
        assert_eq!(varint_bytes(127), vec![0x7f]);
        assert_eq!(varint_bytes(128), vec![0x80, 0x01]);
        assert_eq!(varint_bytes(u32::MAX), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
    }

    #[test]
    fn varint_reads_back_and_rejects_overlong() {
        let bytes = varint_bytes(300_000);
        let mut r = Reader { bytes: &bytes, pos: 0, order: Endianness::Little };
        assert_eq!(r.varint().unwrap(), 300_000);

        let overlong = [0xff, 0xff, 0xff, 0xff, 0x7f];
        let mut r = Reader { bytes: &overlong, pos: 0, order: Endianness::Little };
        assert_eq!(r.varint().unwrap_err().kind, CodecErrorKind::VarIntOverflow);
    }

    #[test]
    fn empty_tree_layout() {
        let bytes = encode(&ResolvedTree::default()).unwrap();
        // header, one pooled "" string, root record (name 0, no base, no entries), checksum
        assert_eq!(&bytes[..4], b"CFGB");
        assert_eq!(&bytes[4..7], &[0, 1, 0]);
        assert_eq!(&bytes[7..13], &[1, 0, 0, 0, 0, 0]);
        assert_eq!(bytes.len(), 17);
        assert_eq!(decode(&bytes).unwrap(), ResolvedTree::default());
    }

    fn nested_arrays(levels: usize) -> ResolvedTree {
        let mut value = Value::Array(vec![]);
        for _ in 1..levels {
            value = Value::Array(vec![value]);
        }
        let mut tree = ResolvedTree::default();
        tree.root.properties.insert("deep".into(), value.into());
        tree
    }

    #[test]
    fn array_nesting_limit() {
        let ok = nested_arrays(MAX_DEPTH);
        assert_eq!(decode(&encode(&ok).unwrap()).unwrap(), ok);

        let bytes = encode(&nested_arrays(MAX_DEPTH + 1)).unwrap();
        assert_eq!(decode(&bytes).unwrap_err().kind, CodecErrorKind::NestingTooDeep(MAX_DEPTH));
    }

    #[test]
    fn big_endian_header_flag() {
        let bytes = Codec::new(Endianness::Big).encode(&ResolvedTree::default()).unwrap();
        assert_eq!(&bytes[4..7], &[1, 0, 1]);
        assert_eq!(decode(&bytes).unwrap(), ResolvedTree::default());
    }
}

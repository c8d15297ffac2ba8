//! The engine's own binarized config format ("raP").
//!
//! Unlike the `CFGB` codec this stores the unresolved document: class bodies
//! keep their base name, forward declarations and deletes, so reading one
//! back gives a [`Document`] that still needs resolving. All fixed-width
//! fields are little-endian; counts are compressed ints (see [`crate::codec`]).
//!
//! ```text
//! header      "\0raP" | u32 0 | u32 8 | enum_offset u32
//! body        base asciiz ("" = none) | entry_count cint | entry*
//! entry       0 class    name asciiz | body_offset u32
//!             1 value    subtype u8 | name asciiz | value
//!             2 array    name asciiz | array
//!             3 extern   name asciiz
//!             4 delete   name asciiz
//!             5 array+=  flags u32 | name asciiz | array
//! value       0 string asciiz | 1 float f32 | 2 int i32 | 4 expression asciiz
//! array       count cint | { subtype u8 | value, or 3 = nested array }*
//! enum table  count u32 | { name asciiz | value u32 }*
//! ```
//!
//! The root body follows the header directly. Class bodies are written after
//! the body that names them and reached through their absolute offset.
//! Expression values come back as strings; the enum table is not read.
//! LZSS-compressed files are not supported.

use crate::ast::{ClassNode, Document, Entry};
use crate::codec::{
    put_u32, put_varint, CodecError, CodecErrorKind, Endianness, Reader, MAX_DEPTH,
};
use crate::lexer::Position;
use crate::value::Value;
use tracing::{debug, trace};

pub const RAP_MAGIC: [u8; 4] = *b"\0raP";
const HEADER_LEN: usize = 16;

const ENTRY_CLASS: u8 = 0;
const ENTRY_VALUE: u8 = 1;
const ENTRY_ARRAY: u8 = 2;
const ENTRY_EXTERN: u8 = 3;
const ENTRY_DELETE: u8 = 4;
const ENTRY_ARRAY_FLAGGED: u8 = 5;

const VALUE_STRING: u8 = 0;
const VALUE_FLOAT: u8 = 1;
const VALUE_INT: u8 = 2;
const VALUE_ARRAY: u8 = 3;
const VALUE_EXPRESSION: u8 = 4;

/// Magic plus the two fixed header words.
pub fn is_rap(bytes: &[u8]) -> bool {
    bytes.len() >= 12
        && bytes[..4] == RAP_MAGIC
        && bytes[4..8] == 0u32.to_le_bytes()
        && bytes[8..12] == 8u32.to_le_bytes()
}

/// Read a raP buffer into an unresolved document.
pub fn read_rap(bytes: &[u8]) -> Result<Document, CodecError> {
    if bytes.len() >= 4 && bytes[..4] != RAP_MAGIC {
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        return Err(CodecError { offset: 0, kind: CodecErrorKind::BadMagic(magic) });
    }
    if bytes.len() < HEADER_LEN {
        return Err(CodecError { offset: bytes.len(), kind: CodecErrorKind::Truncated });
    }
    if !is_rap(bytes) {
        return Err(CodecError { offset: 4, kind: CodecErrorKind::UnknownFlags(bytes[4]) });
    }
    let mut r = Reader::new(bytes, Endianness::Little);
    r.seek(12);
    let enum_offset = r.u32()?;
    let (base, entries) = read_body(&mut r, 0)?;
    if !base.is_empty() {
        debug!(base = %base, "ignoring base of the root body");
    }
    debug!(bytes = bytes.len(), entries = entries.len(), enum_offset, "read raP config");
    Ok(Document { entries })
}

fn at(offset: usize) -> Position {
    Position { offset, ..Position::start() }
}

fn read_body(r: &mut Reader<'_>, depth: usize) -> Result<(String, Vec<Entry>), CodecError> {
    if depth > MAX_DEPTH {
        return Err(r.error(CodecErrorKind::NestingTooDeep(MAX_DEPTH)));
    }
    let base = r.zstring()?.to_string();
    let count = r.varint()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        entries.push(read_entry(r, depth)?);
    }
    Ok((base, entries))
}

fn read_entry(r: &mut Reader<'_>, depth: usize) -> Result<Entry, CodecError> {
    let start = r.position();
    let position = at(start);
    Ok(match r.u8()? {
        ENTRY_CLASS => {
            let name = r.zstring()?.to_string();
            let offset = r.u32()?;
            if offset as usize >= r.len() {
                return Err(CodecError {
                    offset: r.position() - 4,
                    kind: CodecErrorKind::OffsetOutOfRange(offset),
                });
            }
            let resume = r.position();
            r.seek(offset as usize);
            let (base, body) = read_body(r, depth + 1)?;
            r.seek(resume);
            trace!(class = %name, offset, entries = body.len(), "read class body");
            Entry::Class(ClassNode {
                name,
                base: (!base.is_empty()).then_some(base),
                body: Some(body),
                position,
            })
        }
        ENTRY_VALUE => {
            let subtype = r.u8()?;
            let name = r.zstring()?.to_string();
            let value = read_value(r, subtype, depth)?;
            Entry::Property { name, value, position }
        }
        ENTRY_ARRAY => {
            let name = r.zstring()?.to_string();
            let value = read_array(r, depth)?;
            Entry::Property { name, value, position }
        }
        ENTRY_ARRAY_FLAGGED => {
            let flags = r.u32()?;
            let name = r.zstring()?.to_string();
            trace!(name = %name, flags, "array with append flags read as plain array");
            let value = read_array(r, depth)?;
            Entry::Property { name, value, position }
        }
        ENTRY_EXTERN => {
            let name = r.zstring()?.to_string();
            Entry::Class(ClassNode { name, base: None, body: None, position })
        }
        ENTRY_DELETE => Entry::Delete { name: r.zstring()?.to_string(), position },
        other => {
            return Err(CodecError { offset: start, kind: CodecErrorKind::UnknownEntryType(other) })
        }
    })
}

fn read_value(r: &mut Reader<'_>, subtype: u8, depth: usize) -> Result<Value, CodecError> {
    Ok(match subtype {
        VALUE_STRING | VALUE_EXPRESSION => Value::String(r.zstring()?.to_string()),
        VALUE_FLOAT => Value::Float(f32::from_bits(r.u32()?)),
        VALUE_INT => Value::Int(r.u32()? as i32),
        VALUE_ARRAY => read_array(r, depth + 1)?,
        other => {
            let offset = r.position().saturating_sub(1);
            return Err(CodecError { offset, kind: CodecErrorKind::UnknownTypeTag(other) });
        }
    })
}

fn read_array(r: &mut Reader<'_>, depth: usize) -> Result<Value, CodecError> {
    if depth > MAX_DEPTH {
        return Err(r.error(CodecErrorKind::NestingTooDeep(MAX_DEPTH)));
    }
    let count = r.varint()?;
    let mut elements = Vec::new();
    for _ in 0..count {
        let subtype = r.u8()?;
        elements.push(read_value(r, subtype, depth)?);
    }
    Ok(Value::Array(elements))
}

/// Write a document as raP, with an empty enum table.
pub fn write_rap(document: &Document) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    out.extend_from_slice(&RAP_MAGIC);
    put_u32(&mut out, Endianness::Little, 0);
    put_u32(&mut out, Endianness::Little, 8);
    put_u32(&mut out, Endianness::Little, 0);
    write_body(&mut out, None, &document.entries)?;

    let enum_offset = offset_u32(out.len())?;
    out[12..16].copy_from_slice(&enum_offset.to_le_bytes());
    put_u32(&mut out, Endianness::Little, 0);
    debug!(bytes = out.len(), "wrote raP config");
    Ok(out)
}

fn offset_u32(n: usize) -> Result<u32, CodecError> {
    u32::try_from(n)
        .map_err(|_| CodecError { offset: n, kind: CodecErrorKind::TooLarge("raP offset") })
}

fn write_body(out: &mut Vec<u8>, base: Option<&str>, entries: &[Entry]) -> Result<(), CodecError> {
    put_zstring(out, base.unwrap_or(""))?;
    put_varint(out, offset_u32(entries.len())?);
    // Offset slots to patch once each body is placed after this one.
    let mut bodies: Vec<(usize, &ClassNode)> = Vec::new();
    for entry in entries {
        match entry {
            Entry::Class(class) if class.is_forward() => {
                out.push(ENTRY_EXTERN);
                put_zstring(out, &class.name)?;
            }
            Entry::Class(class) => {
                out.push(ENTRY_CLASS);
                put_zstring(out, &class.name)?;
                bodies.push((out.len(), class));
                put_u32(out, Endianness::Little, 0);
            }
            Entry::Property { name, value: value @ Value::Array(_), .. } => {
                out.push(ENTRY_ARRAY);
                put_zstring(out, name)?;
                write_value_payload(out, value)?;
            }
            Entry::Property { name, value, .. } => {
                out.push(ENTRY_VALUE);
                out.push(value_subtype(value));
                put_zstring(out, name)?;
                write_value_payload(out, value)?;
            }
            Entry::Delete { name, .. } => {
                out.push(ENTRY_DELETE);
                put_zstring(out, name)?;
            }
        }
    }
    for (slot, class) in bodies {
        let offset = offset_u32(out.len())?;
        out[slot..slot + 4].copy_from_slice(&offset.to_le_bytes());
        write_body(out, class.base.as_deref(), class.entries())?;
    }
    Ok(())
}

fn value_subtype(value: &Value) -> u8 {
    match value {
        Value::String(_) => VALUE_STRING,
        Value::Float(_) => VALUE_FLOAT,
        Value::Int(_) => VALUE_INT,
        Value::Array(_) => VALUE_ARRAY,
    }
}

/// Payload without the subtype byte; arrays write their count and tagged elements.
fn write_value_payload(out: &mut Vec<u8>, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::String(s) => put_zstring(out, s)?,
        Value::Float(x) => put_u32(out, Endianness::Little, x.to_bits()),
        Value::Int(x) => put_u32(out, Endianness::Little, *x as u32),
        Value::Array(elements) => {
            put_varint(out, offset_u32(elements.len())?);
            for element in elements {
                out.push(value_subtype(element));
                write_value_payload(out, element)?;
            }
        }
    }
    Ok(())
}

fn put_zstring(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    if s.as_bytes().contains(&0) {
        return Err(CodecError { offset: out.len(), kind: CodecErrorKind::NulInString });
    }
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

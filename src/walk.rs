//! Navigate encoded bytes without decoding them.
//!
//! Sub-class records carry a byte-length prefix, so a class deep in a large
//! file can be located by skipping every sibling sub-class wholesale. Only the
//! header, the string table and the entry headers along the path are read.
//!
//! | Use case | Prefer |
//! |----------|--------|
//! | Byte range of one class record | [`class_extent`] |
//! | Decode a single class | [`decode_class_at`] |
//! | Decode everything | [codec](crate::codec) |

use crate::codec::{self, CodecError, CodecErrorKind, Reader, TypeTag, MAX_DEPTH};
use crate::resolve::ResolvedClass;
use std::ops::Range;

/// Cursor over an encoded buffer that has passed header and checksum validation.
#[derive(Debug, Clone)]
pub struct BinaryWalker<'a> {
    reader: Reader<'a>,
    strings: Vec<&'a str>,
    root: Range<usize>,
}

impl<'a> BinaryWalker<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let (reader, strings) = codec::open(bytes)?;
        let root = reader.position()..reader.position() + reader.remaining();
        Ok(BinaryWalker { reader, strings, root })
    }

    /// The decoded string pool, in pool order.
    pub fn strings(&self) -> &[&'a str] {
        &self.strings
    }

    pub fn position(&self) -> usize {
        self.reader.position()
    }

    /// Byte range of the class record at `path`; the empty path is the root record.
    pub fn find_class(&mut self, path: &[&str]) -> Result<Option<Range<usize>>, CodecError> {
        let mut current = self.root.clone();
        for segment in path {
            match self.find_child(current.start, segment)? {
                Some(range) => current = range,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Decode only the class record at `path`.
    pub fn decode_class(&mut self, path: &[&str]) -> Result<Option<ResolvedClass>, CodecError> {
        let Some(range) = self.find_class(path)? else {
            return Ok(None);
        };
        self.reader.seek(range.start);
        let class = codec::read_record(&mut self.reader, &self.strings, path.len())?;
        Ok(Some(class))
    }

    /// Scan the record starting at `record` for a sub-class entry called `name`.
    fn find_child(&mut self, record: usize, name: &str) -> Result<Option<Range<usize>>, CodecError> {
        let r = &mut self.reader;
        r.seek(record);
        r.string(&self.strings)?;
        r.varint()?;
        r.u8()?;
        let count = r.varint()?;
        for _ in 0..count {
            let entry_name = r.string(&self.strings)?;
            match r.tag()? {
                TypeTag::SubClass => {
                    let len = r.u32()? as usize;
                    let start = r.position();
                    if entry_name == name {
                        if r.remaining() < len {
                            return Err(r.error(CodecErrorKind::Truncated));
                        }
                        return Ok(Some(start..start + len));
                    }
                    r.take(len)?;
                }
                TypeTag::Delete => {}
                tag => skip_payload(r, tag, 1)?,
            }
        }
        Ok(None)
    }
}

fn skip_payload(r: &mut Reader<'_>, tag: TypeTag, depth: usize) -> Result<(), CodecError> {
    match tag {
        TypeTag::String => {
            r.varint()?;
        }
        TypeTag::Float | TypeTag::Int => {
            r.take(4)?;
        }
        TypeTag::Array => {
            if depth > MAX_DEPTH {
                return Err(r.error(CodecErrorKind::NestingTooDeep(MAX_DEPTH)));
            }
            let count = r.varint()?;
            for _ in 0..count {
                let tag = r.tag()?;
                skip_payload(r, tag, depth + 1)?;
            }
        }
        TypeTag::SubClass | TypeTag::Delete => {
            let offset = r.position().saturating_sub(1);
            return Err(CodecError { offset, kind: CodecErrorKind::UnknownTypeTag(tag as u8) });
        }
    }
    Ok(())
}

/// Byte range (within `bytes`) of the class record at `path`.
pub fn class_extent(bytes: &[u8], path: &[&str]) -> Result<Option<Range<usize>>, CodecError> {
    BinaryWalker::new(bytes)?.find_class(path)
}

/// Decode the class at `path` without decoding the rest of the tree.
pub fn decode_class_at(bytes: &[u8], path: &[&str]) -> Result<Option<ResolvedClass>, CodecError> {
    BinaryWalker::new(bytes)?.decode_class(path)
}

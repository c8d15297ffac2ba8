//! # cfgcodec: class-based config compiler and binary codec
//!
//! Parses the hierarchical config language used for mission and scenario
//! files (classes with single inheritance, scalar and array properties,
//! deletions, forward declarations), resolves inheritance into flattened
//! property maps, and converts between that resolved form and a compact
//! binary encoding. Resolved and unresolved trees can be written back as text.
//!
//! ## Pipeline
//!
//! ```text
//! text --lexer--> tokens --parser--> Document --resolve--> ResolvedTree
//!                                                          |        ^
//!                                                     encode|        |decode
//!                                                          v        |
//!                                                          binary bytes
//! ResolvedTree | Document --emit--> text
//! raP bytes --read_rap--> Document --write_rap--> raP bytes
//! ```
//!
//! [`read`] takes bytes of any of the three kinds and returns a resolved tree.
//!
//! ## Example source
//!
//! ```text
//! version=54;
//! class Base { side="West"; skill=0.6; };
//! class Unit : Base
//! {
//!     skill=0.9;
//!     delete side;
//!     position[]={1.5,0,-2};
//! };
//! ```
//!
//! ## Usage
//!
//! ```
//! let bytes = cfgcodec::binarize("class A { x = 1; }; class B : A { y[] = {2, \"z\"}; };", None).unwrap();
//! let text = cfgcodec::debinarize(&bytes).unwrap();
//! assert!(text.contains("y[]={2,\"z\"};"));
//! ```
//!
//! Unresolved bases never fail a call; they are reported by
//! [`ResolvedTree::warnings`] and logged through `tracing`.

pub mod ast;
pub mod codec;
pub mod emit;
pub mod lexer;
pub mod parser;
pub mod rap;
pub mod resolve;
pub mod value;
pub mod walk;

pub use ast::{ClassNode, Document, Entry};
pub use codec::{decode, encode, Codec, CodecError, CodecErrorKind, Endianness};
pub use emit::{emit, Emit};
pub use lexer::{tokenize, LexError, Lexer, Position, Token, TokenKind};
pub use parser::{parse, ParseError};
pub use rap::{is_rap, read_rap, write_rap, RAP_MAGIC};
pub use resolve::{
    resolve, resolve_with, BaseRef, BaseState, ClassLookup, PropertyMap, ResolvedClass,
    ResolvedTree, Resolver, UnresolvedBaseWarning,
};
pub use value::{Property, Value};
pub use walk::{class_extent, decode_class_at, BinaryWalker};

/// Any failure of a whole-pipeline call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("config text is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    /// Source position for text errors, byte offset for binary ones.
    pub fn location(&self) -> String {
        match self {
            Error::Lex(e) => e.position.to_string(),
            Error::Parse(e) => e.position().to_string(),
            Error::Codec(e) => format!("offset {}", e.offset),
            Error::Utf8(e) => format!("offset {}", e.valid_up_to()),
        }
    }
}

/// Parse, resolve and encode config text in one call.
pub fn binarize(source: &str, lookup: Option<&dyn ClassLookup>) -> Result<Vec<u8>, Error> {
    let document = parse(source)?;
    let tree = match lookup {
        Some(lookup) => resolve_with(&document, lookup),
        None => resolve(&document),
    };
    for warning in tree.warnings() {
        tracing::debug!(%warning, "binarizing with unresolved base");
    }
    Ok(encode(&tree)?)
}

/// Decode binary config and render it as text.
pub fn debinarize(bytes: &[u8]) -> Result<String, Error> {
    let tree = decode(bytes)?;
    Ok(emit(&tree))
}

/// Kind of config data, told apart by its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Resolved binary written by [`encode`].
    Binary,
    /// The engine's raP binary, see [`rap`].
    Rap,
    /// Anything else is taken to be config text.
    Text,
}

impl Format {
    pub fn detect(bytes: &[u8]) -> Format {
        if bytes.starts_with(&codec::MAGIC) {
            Format::Binary
        } else if bytes.starts_with(&RAP_MAGIC) {
            Format::Rap
        } else {
            Format::Text
        }
    }
}

/// Load config bytes of any [`Format`] into a resolved tree.
///
/// Text and raP are parsed and resolved, with `lookup` as the external
/// catalog. Encoded binary is already resolved; `lookup` then only fills in
/// bases that were missing when it was written.
pub fn read(bytes: &[u8], lookup: Option<&dyn ClassLookup>) -> Result<ResolvedTree, Error> {
    let format = Format::detect(bytes);
    tracing::debug!(?format, bytes = bytes.len(), "reading config");
    let document = match format {
        Format::Binary => {
            let mut tree = decode(bytes)?;
            if let Some(lookup) = lookup {
                tree.complete(lookup);
            }
            return Ok(tree);
        }
        Format::Rap => read_rap(bytes)?,
        Format::Text => parse(std::str::from_utf8(bytes)?)?,
    };
    Ok(match lookup {
        Some(lookup) => resolve_with(&document, lookup),
        None => resolve(&document),
    })
}

//! Parse config tokens into a [`Document`].
//!
//! Single pass, recursive descent, one token of lookahead:
//!
//! ```text
//! statement := ident ("[]" | "[" "]") "=" array ";"
//!            | ident "=" scalar ";"
//!            | "class" ident (":" ident)? ";"
//!            | "class" ident (":" ident)? "{" statement* "}" ";"
//!            | "delete" ident ";"
//! array     := "{" (element ("," element)* ","?)? "}"
//! element   := scalar | array
//! scalar    := number | string | "true" | "false"
//! ```

use crate::ast::*;
use crate::codec::MAX_DEPTH;
use crate::lexer::{LexError, Lexer, Position, Token, TokenKind};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("parse error at {position}: expected {expected}, found {found}")]
    Unexpected {
        position: Position,
        expected: String,
        found: String,
    },
    #[error("parse error at {position}: nesting deeper than {limit}")]
    TooDeep { position: Position, limit: usize },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lex(e) => e.position,
            ParseError::Unexpected { position, .. } | ParseError::TooDeep { position, .. } => *position,
        }
    }
}

/// Parse config source text into a document tree.
pub fn parse(source: &str) -> Result<Document, ParseError> {
    Parser::new(Lexer::new(source))?.parse_document()
}

/// Parse a pre-lexed token sequence (e.g. the output of [`crate::lexer::tokenize`]).
pub fn parse_tokens(tokens: Vec<Token>) -> Result<Document, ParseError> {
    Parser::new(tokens.into_iter().map(Ok))?.parse_document()
}

pub struct Parser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    tokens: I,
    current: Token,
    depth: usize,
}

impl<I> Parser<I>
where
    I: Iterator<Item = Result<Token, LexError>>,
{
    pub fn new(mut tokens: I) -> Result<Self, ParseError> {
        let current = Self::pull(&mut tokens, Position::start())?;
        Ok(Parser { tokens, current, depth: 0 })
    }

    /// Next token; a stream that ends without `Eof` is treated as ending there.
    fn pull(tokens: &mut I, last: Position) -> Result<Token, ParseError> {
        match tokens.next() {
            Some(token) => Ok(token?),
            None => Ok(Token { kind: TokenKind::Eof, position: last }),
        }
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        if self.current.kind == TokenKind::Eof {
            return Ok(self.current.clone());
        }
        let next = Self::pull(&mut self.tokens, self.current.position)?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T, ParseError> {
        Err(ParseError::Unexpected {
            position: self.current.position,
            expected: expected.to_string(),
            found: self.current.kind.to_string(),
        })
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep { position: self.current.position, limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn at_symbol(&self, c: char) -> bool {
        self.current.kind == TokenKind::Symbol(c)
    }

    fn expect_symbol(&mut self, c: char) -> Result<(), ParseError> {
        if self.at_symbol(c) {
            self.advance()?;
            Ok(())
        } else {
            self.unexpected(&format!("`{}`", c))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Ident(name) = &self.current.kind {
            let name = name.clone();
            self.advance()?;
            Ok(name)
        } else {
            self.unexpected("identifier")
        }
    }

    pub fn parse_document(mut self) -> Result<Document, ParseError> {
        let mut entries = Vec::new();
        while self.current.kind != TokenKind::Eof {
            entries.push(self.parse_statement()?);
        }
        Ok(Document { entries })
    }

    fn parse_statement(&mut self) -> Result<Entry, ParseError> {
        let position = self.current.position;
        match self.current.kind {
            TokenKind::Class => {
                self.advance()?;
                self.parse_class(position).map(Entry::Class)
            }
            TokenKind::Delete => {
                self.advance()?;
                let name = self.expect_ident()?;
                self.expect_symbol(';')?;
                Ok(Entry::Delete { name, position })
            }
            TokenKind::Ident(_) => self.parse_property(position),
            _ => self.unexpected("`class`, `delete` or identifier"),
        }
    }

    fn parse_class(&mut self, position: Position) -> Result<ClassNode, ParseError> {
        let name = self.expect_ident()?;
        let base = if self.at_symbol(':') {
            self.advance()?;
            Some(self.expect_ident()?)
        } else {
            None
        };
        if self.at_symbol(';') {
            self.advance()?;
            return Ok(ClassNode { name, base, body: None, position });
        }
        if !self.at_symbol('{') {
            return self.unexpected(if base.is_some() { "`{` or `;`" } else { "`:`, `{` or `;`" });
        }
        self.advance()?;
        self.enter()?;
        let mut body = Vec::new();
        while !self.at_symbol('}') {
            if self.current.kind == TokenKind::Eof {
                return self.unexpected("`}`");
            }
            body.push(self.parse_statement()?);
        }
        self.advance()?;
        self.depth -= 1;
        self.expect_symbol(';')?;
        Ok(ClassNode { name, base, body: Some(body), position })
    }

    fn parse_property(&mut self, position: Position) -> Result<Entry, ParseError> {
        let name = self.expect_ident()?;
        let is_array = match self.current.kind {
            TokenKind::ArrayMarker => {
                self.advance()?;
                true
            }
            TokenKind::Symbol('[') => {
                self.advance()?;
                self.expect_symbol(']')?;
                true
            }
            _ => false,
        };
        self.expect_symbol('=')?;
        let value = if is_array {
            self.parse_array()?
        } else {
            self.parse_scalar("value")?
        };
        self.expect_symbol(';')?;
        Ok(Entry::Property { name, value, position })
    }

    fn parse_scalar(&mut self, expected: &str) -> Result<Value, ParseError> {
        let value = match &self.current.kind {
            TokenKind::Int(n) => Value::Int(*n),
            TokenKind::Float(n) => Value::Float(*n),
            TokenKind::Str(s) => Value::String(s.clone()),
            TokenKind::Ident(s) if s.eq_ignore_ascii_case("true") => Value::Int(1),
            TokenKind::Ident(s) if s.eq_ignore_ascii_case("false") => Value::Int(0),
            _ => return self.unexpected(expected),
        };
        self.advance()?;
        Ok(value)
    }

    fn parse_array(&mut self) -> Result<Value, ParseError> {
        self.expect_symbol('{')?;
        self.enter()?;
        let mut elements = Vec::new();
        loop {
            if self.at_symbol('}') {
                break;
            }
            let element = if self.at_symbol('{') {
                self.parse_array()?
            } else {
                self.parse_scalar("array element or `}`")?
            };
            elements.push(element);
            if self.at_symbol(',') {
                self.advance()?;
            } else if !self.at_symbol('}') {
                return self.unexpected("`,` or `}`");
            }
        }
        self.advance()?;
        self.depth -= 1;
        Ok(Value::Array(elements))
    }
}

//! Tokenize config source text using PEST.
//!
//! The grammar in `grammar.pest` only describes single tokens. [`Lexer`] pulls
//! them one at a time: it skips trivia (whitespace, `//`, `#` and `/* */`
//! comments), then matches exactly one token against the remaining input. That
//! keeps the lexer lazy and lets it restart at any byte offset with
//! [`Lexer::at`].

use pest::Parser;
use pest_derive::Parser as PestParser;
use std::fmt;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct TokenGrammar;

/// Location in source text. `line` and `column` are 1-based, `column` counts chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn start() -> Self {
        Position { offset: 0, line: 1, column: 1 }
    }

    /// Position of `offset` in `source`. Offsets past the end clamp to the end.
    pub fn locate(source: &str, offset: usize) -> Self {
        let mut pos = Position::start();
        pos.advance(&source[..floor_char_boundary(source, offset)]);
        pos
    }

    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += consumed.len();
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

fn floor_char_boundary(s: &str, mut offset: usize) -> usize {
    if offset >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i32),
    Float(f32),
    /// String contents with `""` already collapsed and `\n` concatenation applied.
    Str(String),
    Class,
    Delete,
    /// `[]` written without a gap.
    ArrayMarker,
    /// One of `{ } [ ] ( ) = ; , :`.
    Symbol(char),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "identifier `{}`", s),
            TokenKind::Int(n) => write!(f, "number `{}`", n),
            TokenKind::Float(n) => write!(f, "number `{:?}`", n),
            TokenKind::Str(s) => write!(f, "string \"{}\"", s),
            TokenKind::Class => write!(f, "`class`"),
            TokenKind::Delete => write!(f, "`delete`"),
            TokenKind::ArrayMarker => write!(f, "`[]`"),
            TokenKind::Symbol(c) => write!(f, "`{}`", c),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexErrorReason {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("numeric literal `{0}` out of range")]
    NumberOutOfRange(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lex error at {position}: {reason}")]
pub struct LexError {
    pub position: Position,
    pub reason: LexErrorReason,
}

/// Pull-based tokenizer. Yields tokens up to and including [`TokenKind::Eof`],
/// then `None`. After an error it also yields `None`.
#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    source: &'src str,
    position: Position,
    done: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer { source, position: Position::start(), done: false }
    }

    /// Restart lexing at a byte offset (e.g. the offset of a previously returned token).
    pub fn at(source: &'src str, offset: usize) -> Self {
        Lexer { source, position: Position::locate(source, offset), done: false }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    fn rest(&self) -> &'src str {
        &self.source[self.position.offset..]
    }

    fn skip_trivia(&mut self) {
        let rest = self.rest();
        let len = TokenGrammar::parse(Rule::trivia, rest)
            .ok()
            .and_then(|mut pairs| pairs.next())
            .map(|pair| pair.as_span().end())
            .unwrap_or(0);
        self.position.advance(&rest[..len]);
    }

    /// Lex the next token.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let start = self.position;
        let rest = self.rest();
        if rest.is_empty() {
            return Ok(Token { kind: TokenKind::Eof, position: start });
        }
        let pair = TokenGrammar::parse(Rule::token, rest)
            .ok()
            .and_then(|mut pairs| pairs.next())
            .and_then(|token| token.into_inner().next())
            .ok_or_else(|| LexError { position: start, reason: classify_failure(rest) })?;
        let text = pair.as_str();
        let kind = match pair.as_rule() {
            Rule::ident => keyword_or_ident(text),
            Rule::hex_number => lex_hex(text),
            Rule::number => lex_number(text),
            Rule::string => Some(TokenKind::Str(
                pair.into_inner()
                    .map(|piece| piece.as_str().replace("\"\"", "\""))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            Rule::array_marker => Some(TokenKind::ArrayMarker),
            Rule::symbol => text.chars().next().map(TokenKind::Symbol),
            _ => None,
        }
        .ok_or_else(|| LexError {
            position: start,
            reason: match text.chars().next() {
                Some(c) if c.is_ascii_digit() || matches!(c, '+' | '-' | '.') => {
                    LexErrorReason::NumberOutOfRange(text.to_string())
                }
                Some(c) => LexErrorReason::InvalidCharacter(c),
                None => LexErrorReason::InvalidCharacter('\0'),
            },
        })?;
        self.position.advance(text);
        Ok(Token { kind, position: start })
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_token();
        match &result {
            Ok(Token { kind: TokenKind::Eof, .. }) | Err(_) => self.done = true,
            Ok(_) => {}
        }
        Some(result)
    }
}

impl std::iter::FusedIterator for Lexer<'_> {}

/// Tokenize a whole source buffer. The last token is always [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).collect()
}

fn classify_failure(rest: &str) -> LexErrorReason {
    if rest.starts_with('"') {
        LexErrorReason::UnterminatedString
    } else if rest.starts_with("/*") {
        LexErrorReason::UnterminatedComment
    } else {
        LexErrorReason::InvalidCharacter(rest.chars().next().unwrap_or('\0'))
    }
}

fn keyword_or_ident(text: &str) -> Option<TokenKind> {
    Some(if text.eq_ignore_ascii_case("class") {
        TokenKind::Class
    } else if text.eq_ignore_ascii_case("delete") {
        TokenKind::Delete
    } else {
        TokenKind::Ident(text.to_string())
    })
}

fn lex_hex(text: &str) -> Option<TokenKind> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let magnitude = i64::from_str_radix(&digits[2..], 16).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).ok().map(TokenKind::Int)
}

fn lex_number(text: &str) -> Option<TokenKind> {
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(n) = text.parse::<i32>() {
            return Some(TokenKind::Int(n));
        }
    }
    text.parse::<f32>().ok().filter(|f| f.is_finite()).map(TokenKind::Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).expect("lex").into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn exponent_float_is_one_token() {
        assert_eq!(
            kinds("atlOffset=-2.6702881e-005;"),
            vec![
                TokenKind::Ident("atlOffset".into()),
                TokenKind::Symbol('='),
                TokenKind::Float(-2.6702881e-5),
                TokenKind::Symbol(';'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let src = "// comment = 1;\n#include \"x.hpp\"\n/* block\n */ a";
        assert_eq!(kinds(src), vec![TokenKind::Ident("a".into()), TokenKind::Eof]);
    }

    #[test]
    fn int_overflow_becomes_float() {
        assert_eq!(kinds("3000000000")[0], TokenKind::Float(3.0e9));
        assert_eq!(kinds("0x10")[0], TokenKind::Int(16));
        assert_eq!(kinds("1.0")[0], TokenKind::Float(1.0));
    }

    #[test]
    fn doubled_quote_and_concatenation() {
        assert_eq!(kinds(r#""say ""hi""""#)[0], TokenKind::Str("say \"hi\"".into()));
        assert_eq!(kinds("\"a\" \\n \"b\"")[0], TokenKind::Str("a\nb".into()));
    }

    #[test]
    fn keywords_ignore_case() {
        assert_eq!(kinds("Class DELETE")[..2], [TokenKind::Class, TokenKind::Delete]);
    }

    #[test]
    fn unterminated_string_reports_opening_quote() {
        let err = tokenize("a = \"oops;\n").unwrap_err();
        assert_eq!(err.reason, LexErrorReason::UnterminatedString);
        assert_eq!(err.position, Position { offset: 4, line: 1, column: 5 });
    }

    #[test]
    fn invalid_character() {
        let err = tokenize("x = 1;\n  @").unwrap_err();
        assert_eq!(err.reason, LexErrorReason::InvalidCharacter('@'));
        assert_eq!((err.position.line, err.position.column), (2, 3));
    }

    #[test]
    fn stops_after_eof_and_restarts() {
        let src = "a b";
        let mut lexer = Lexer::new(src);
        assert!(matches!(lexer.next(), Some(Ok(Token { kind: TokenKind::Ident(_), .. }))));
        assert!(matches!(lexer.next(), Some(Ok(_))));
        assert!(matches!(lexer.next(), Some(Ok(Token { kind: TokenKind::Eof, .. }))));
        assert!(lexer.next().is_none());
        let mut again = Lexer::at(src, 2);
        assert_eq!(again.next_token().unwrap().kind, TokenKind::Ident("b".into()));
    }
}

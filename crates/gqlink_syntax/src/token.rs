//! Token kinds for GraphQL executable documents.

use std::fmt;

/// A byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Creates a new span.
    #[inline]
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The kind of a lexed token.
///
/// GraphQL keywords (`query`, `fragment`, `on`, ...) are contextual, so they
/// lex as [`TokenKind::Name`] and the parser matches on the token text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Bang,
    Dollar,
    LParen,
    RParen,
    Spread,
    Colon,
    Eq,
    At,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Name,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    BlockStringLiteral,
    Eof,
    Error,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Bang => "`!`",
            TokenKind::Dollar => "`$`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Spread => "`...`",
            TokenKind::Colon => "`:`",
            TokenKind::Eq => "`=`",
            TokenKind::At => "`@`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Name => "a name",
            TokenKind::IntLiteral => "an integer",
            TokenKind::FloatLiteral => "a float",
            TokenKind::StringLiteral => "a string",
            TokenKind::BlockStringLiteral => "a block string",
            TokenKind::Eof => "end of input",
            TokenKind::Error => "an invalid token",
        };
        f.write_str(text)
    }
}

/// A single lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[inline]
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

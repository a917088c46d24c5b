//! Syntax layer for gqlink.
//!
//! This crate provides:
//! - `token`: Token kinds and spans
//! - `lexer`: Tokenization of executable documents
//! - `ast`: Abstract syntax tree types
//! - `parser`: Recursive descent parser

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse, ParseError, Parser};
pub use token::{Span, Token, TokenKind};

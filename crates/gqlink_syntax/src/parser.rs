//! Recursive descent parser for GraphQL executable documents.
//!
//! Parsing is strict: the first syntax error aborts the parse and is returned
//! to the caller as a [`ParseError`]. There is no error recovery, because a
//! document that fails to parse never receives a handle.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use thiserror::Error;

/// A syntax error in an executable document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {span}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

/// Parses a source string into an executable document.
pub fn parse(source: &str) -> Result<Document, ParseError> {
    let mut parser = Parser::new(source);
    parser.parse_document()
}

/// Parser for GraphQL executable documents.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self { lexer, current }
    }

    /// Returns the current token kind.
    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    /// Returns true if at the given kind.
    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Returns true if at a name token with the given text.
    fn at_keyword(&self, keyword: &str) -> bool {
        self.at_kind(TokenKind::Name) && self.current_text() == keyword
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    /// Expects a specific token kind and consumes it.
    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.at_kind(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", kind, self.at())))
        }
    }

    /// Gets the text of the current token.
    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    /// Builds an error at the current token.
    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            span: self.current.span,
        }
    }

    /// Parses a document.
    pub fn parse_document(&mut self) -> Result<Document, ParseError> {
        let mut definitions = Vec::new();

        while !self.at_kind(TokenKind::Eof) {
            definitions.push(self.parse_definition()?);
        }

        if definitions.is_empty() {
            return Err(self.error("expected at least one definition"));
        }

        Ok(Document { definitions })
    }

    /// Parses a top-level definition.
    fn parse_definition(&mut self) -> Result<Definition, ParseError> {
        if self.at_kind(TokenKind::LBrace) {
            return Ok(Definition::Operation(self.parse_operation()?));
        }

        if self.at_kind(TokenKind::Name) {
            return match self.current_text() {
                "query" | "mutation" | "subscription" => {
                    Ok(Definition::Operation(self.parse_operation()?))
                }
                "fragment" => Ok(Definition::Fragment(self.parse_fragment_definition()?)),
                other => Err(self.error(format!(
                    "expected an operation or fragment definition, found `{other}`"
                ))),
            };
        }

        Err(self.error(format!(
            "expected an operation or fragment definition, found {}",
            self.at()
        )))
    }

    /// Parses an operation definition.
    ///
    /// The `{ ... }` shorthand is an anonymous query.
    fn parse_operation(&mut self) -> Result<OperationDefinition, ParseError> {
        let start = self.current.span.start;

        let kind = if self.at_kind(TokenKind::LBrace) {
            OperationKind::Query
        } else {
            let kind = match self.current_text() {
                "query" => OperationKind::Query,
                "mutation" => OperationKind::Mutation,
                _ => OperationKind::Subscription,
            };
            self.advance();
            kind
        };

        let name = if self.at_kind(TokenKind::Name) {
            Some(self.parse_name()?)
        } else {
            None
        };

        let variable_definitions = if self.at_kind(TokenKind::LParen) {
            self.parse_variable_definitions()?
        } else {
            Vec::new()
        };

        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;

        let end = self.current.span.start;
        Ok(OperationDefinition {
            kind,
            name,
            variable_definitions,
            directives,
            selection_set,
            span: Span::new(start, end),
        })
    }

    /// Parses a fragment definition.
    fn parse_fragment_definition(&mut self) -> Result<FragmentDefinition, ParseError> {
        let start = self.current.span.start;
        self.advance(); // fragment

        if self.at_keyword("on") {
            return Err(self.error("fragment name must not be `on`"));
        }
        let name = self.parse_name()?;

        if !self.at_keyword("on") {
            return Err(self.error("expected `on` and a type condition"));
        }
        self.advance(); // on
        let type_condition = self.parse_name()?;

        let directives = self.parse_directives()?;
        let selection_set = self.parse_selection_set()?;

        let end = self.current.span.start;
        Ok(FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: Span::new(start, end),
        })
    }

    /// Parses a name token.
    fn parse_name(&mut self) -> Result<String, ParseError> {
        if !self.at_kind(TokenKind::Name) {
            return Err(self.error(format!("expected a name, found {}", self.at())));
        }
        let name = self.current_text().to_string();
        self.advance();
        Ok(name)
    }

    /// Parses `( $name: Type = default ... )`.
    fn parse_variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, ParseError> {
        self.advance(); // (

        let mut definitions = Vec::new();
        while !self.at_kind(TokenKind::RParen) {
            definitions.push(self.parse_variable_definition()?);
        }
        if definitions.is_empty() {
            return Err(self.error("expected at least one variable definition"));
        }
        self.expect(TokenKind::RParen)?;

        Ok(definitions)
    }

    /// Parses a single variable definition.
    fn parse_variable_definition(&mut self) -> Result<VariableDefinition, ParseError> {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar)?;
        let name = self.parse_name()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        let default_value = if self.at_kind(TokenKind::Eq) {
            self.advance();
            Some(self.parse_value(true)?)
        } else {
            None
        };

        let end = self.current.span.start;
        Ok(VariableDefinition {
            name,
            ty,
            default_value,
            span: Span::new(start, end),
        })
    }

    /// Parses a type reference.
    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let ty = if self.at_kind(TokenKind::LBracket) {
            self.advance();
            let inner = self.parse_type()?;
            self.expect(TokenKind::RBracket)?;
            Type::List(Box::new(inner))
        } else {
            Type::Named(self.parse_name()?)
        };

        if self.at_kind(TokenKind::Bang) {
            self.advance();
            Ok(Type::NonNull(Box::new(ty)))
        } else {
            Ok(ty)
        }
    }

    /// Parses directives.
    fn parse_directives(&mut self) -> Result<Vec<Directive>, ParseError> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) {
            self.advance(); // @
            let name = self.parse_name()?;
            let arguments = if self.at_kind(TokenKind::LParen) {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            directives.push(Directive { name, arguments });
        }
        Ok(directives)
    }

    /// Parses `( name: value ... )`.
    fn parse_arguments(&mut self) -> Result<Vec<Argument>, ParseError> {
        self.advance(); // (

        let mut arguments = Vec::new();
        while !self.at_kind(TokenKind::RParen) {
            let name = self.parse_name()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_value(false)?;
            arguments.push(Argument { name, value });
        }
        if arguments.is_empty() {
            return Err(self.error("expected at least one argument"));
        }
        self.expect(TokenKind::RParen)?;

        Ok(arguments)
    }

    /// Parses a selection set.
    fn parse_selection_set(&mut self) -> Result<SelectionSet, ParseError> {
        let start = self.current.span.start;
        self.expect(TokenKind::LBrace)?;

        let mut selections = Vec::new();
        while !self.at_kind(TokenKind::RBrace) {
            selections.push(self.parse_selection()?);
        }
        if selections.is_empty() {
            return Err(self.error("expected at least one selection"));
        }
        self.expect(TokenKind::RBrace)?;

        let end = self.current.span.start;
        Ok(SelectionSet {
            selections,
            span: Span::new(start, end),
        })
    }

    /// Parses a field, fragment spread, or inline fragment.
    fn parse_selection(&mut self) -> Result<Selection, ParseError> {
        if self.at_kind(TokenKind::Spread) {
            self.advance(); // ...

            if self.at_kind(TokenKind::Name) && !self.at_keyword("on") {
                let name = self.parse_name()?;
                let directives = self.parse_directives()?;
                return Ok(Selection::FragmentSpread(FragmentSpread {
                    name,
                    directives,
                }));
            }

            let type_condition = if self.at_keyword("on") {
                self.advance(); // on
                Some(self.parse_name()?)
            } else {
                None
            };
            let directives = self.parse_directives()?;
            let selection_set = self.parse_selection_set()?;
            return Ok(Selection::InlineFragment(InlineFragment {
                type_condition,
                directives,
                selection_set,
            }));
        }

        Ok(Selection::Field(self.parse_field()?))
    }

    /// Parses a field selection with optional alias.
    fn parse_field(&mut self) -> Result<Field, ParseError> {
        let start = self.current.span.start;
        let first = self.parse_name()?;

        let (alias, name) = if self.at_kind(TokenKind::Colon) {
            self.advance();
            (Some(first), self.parse_name()?)
        } else {
            (None, first)
        };

        let arguments = if self.at_kind(TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };

        let directives = self.parse_directives()?;

        let selection_set = if self.at_kind(TokenKind::LBrace) {
            Some(self.parse_selection_set()?)
        } else {
            None
        };

        let end = self.current.span.start;
        Ok(Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: Span::new(start, end),
        })
    }

    /// Parses an input value.
    ///
    /// With `constant` set, variables are rejected (default values must be
    /// constant).
    fn parse_value(&mut self, constant: bool) -> Result<InputValue, ParseError> {
        match self.at() {
            TokenKind::Dollar => {
                if constant {
                    return Err(self.error("variables are not allowed in default values"));
                }
                self.advance();
                Ok(InputValue::Variable(self.parse_name()?))
            }
            TokenKind::IntLiteral => {
                let text = self.current_text();
                let value = text
                    .parse::<i64>()
                    .map_err(|_| self.error(format!("integer `{text}` is out of range")))?;
                self.advance();
                Ok(InputValue::Int(value))
            }
            TokenKind::FloatLiteral => {
                let text = self.current_text();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| self.error(format!("invalid float `{text}`")))?;
                self.advance();
                Ok(InputValue::Float(value))
            }
            TokenKind::StringLiteral => {
                let value = self.string_value()?;
                self.advance();
                Ok(InputValue::String(value))
            }
            TokenKind::BlockStringLiteral => {
                let value = self.block_string_value();
                self.advance();
                Ok(InputValue::String(value))
            }
            TokenKind::Name => {
                let value = match self.current_text() {
                    "true" => InputValue::Boolean(true),
                    "false" => InputValue::Boolean(false),
                    "null" => InputValue::Null,
                    other => InputValue::Enum(other.to_string()),
                };
                self.advance();
                Ok(value)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.at_kind(TokenKind::RBracket) {
                    items.push(self.parse_value(constant)?);
                }
                self.expect(TokenKind::RBracket)?;
                Ok(InputValue::List(items))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                while !self.at_kind(TokenKind::RBrace) {
                    let name = self.parse_name()?;
                    self.expect(TokenKind::Colon)?;
                    fields.push((name, self.parse_value(constant)?));
                }
                self.expect(TokenKind::RBrace)?;
                Ok(InputValue::Object(fields))
            }
            other => Err(self.error(format!("expected a value, found {other}"))),
        }
    }

    /// Unescapes the current string literal token.
    fn string_value(&self) -> Result<String, ParseError> {
        let raw = self.current_text();
        let inner = &raw[1..raw.len() - 1];

        let mut value = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                value.push(c);
                continue;
            }
            match chars.next() {
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                Some('/') => value.push('/'),
                Some('b') => value.push('\u{0008}'),
                Some('f') => value.push('\u{000C}'),
                Some('n') => value.push('\n'),
                Some('r') => value.push('\r'),
                Some('t') => value.push('\t'),
                Some('u') => {
                    let code = unicode_escape(&mut chars)
                        .ok_or_else(|| self.error("invalid unicode escape sequence"))?;
                    value.push(code);
                }
                _ => return Err(self.error("invalid escape sequence")),
            }
        }
        Ok(value)
    }

    /// Extracts the value of the current block string token.
    fn block_string_value(&self) -> String {
        let raw = self.current_text();
        let inner = &raw[3..raw.len() - 3];
        let inner = inner.replace("\\\"\"\"", "\"\"\"");

        let lines: Vec<&str> = inner.split('\n').map(|l| l.trim_end_matches('\r')).collect();

        // Common indentation of every line after the first, ignoring
        // whitespace-only lines.
        let common_indent = lines
            .iter()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.len() - line.trim_start().len())
            .min()
            .unwrap_or(0);

        let mut stripped: Vec<&str> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                if i == 0 {
                    *line
                } else {
                    &line[line.len().min(common_indent)..]
                }
            })
            .collect();

        while stripped.first().is_some_and(|line| line.trim().is_empty()) {
            stripped.remove(0);
        }
        while stripped.last().is_some_and(|line| line.trim().is_empty()) {
            stripped.pop();
        }

        stripped.join("\n")
    }
}

/// Decodes a `\uXXXX` escape, combining surrogate pairs.
fn unicode_escape(chars: &mut std::str::Chars<'_>) -> Option<char> {
    let first = hex4(chars)?;
    if (0xD800..=0xDBFF).contains(&first) {
        // High surrogate; require a following \uXXXX low surrogate.
        if chars.next() != Some('\\') || chars.next() != Some('u') {
            return None;
        }
        let second = hex4(chars)?;
        if !(0xDC00..=0xDFFF).contains(&second) {
            return None;
        }
        let combined = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
        char::from_u32(combined)
    } else {
        char::from_u32(first)
    }
}

/// Reads four hex digits.
fn hex4(chars: &mut std::str::Chars<'_>) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..4 {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_query() {
        let document = parse("{ hero { name } }").unwrap();
        assert_eq!(document.definitions.len(), 1);
        let op = document.operation("").unwrap();
        assert_eq!(op.kind, OperationKind::Query);
        assert!(op.name.is_none());
        assert_eq!(op.selection_set.selections.len(), 1);
    }

    #[test]
    fn test_operation_kinds() {
        let document = parse(
            "query Q { a } \
             mutation M { b } \
             subscription S { c }",
        )
        .unwrap();
        let kinds: Vec<_> = document.operations().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Query,
                OperationKind::Mutation,
                OperationKind::Subscription,
            ]
        );
        assert_eq!(document.operation("S").unwrap().kind, OperationKind::Subscription);
    }

    #[test]
    fn test_variable_definitions() {
        let document =
            parse("query Hero($episode: Episode = JEDI, $withFriends: Boolean!) { hero }").unwrap();
        let op = document.operation("Hero").unwrap();
        assert_eq!(op.variable_definitions.len(), 2);
        assert_eq!(op.variable_definitions[0].name, "episode");
        assert_eq!(
            op.variable_definitions[0].default_value,
            Some(InputValue::Enum("JEDI".to_string()))
        );
        assert_eq!(op.variable_definitions[1].ty.to_string(), "Boolean!");
    }

    #[test]
    fn test_arguments_and_values() {
        let document = parse(
            r#"{ search(text: "han", first: 3, exact: false, filter: { tags: ["a", "b"], limit: null }, score: 1.5, id: $id) }"#,
        )
        .unwrap();
        let op = document.operation("").unwrap();
        let Selection::Field(field) = &op.selection_set.selections[0] else {
            panic!("expected field");
        };
        assert_eq!(field.arguments.len(), 6);
        assert_eq!(
            field.arguments[0].value,
            InputValue::String("han".to_string())
        );
        assert_eq!(field.arguments[1].value, InputValue::Int(3));
        assert_eq!(field.arguments[2].value, InputValue::Boolean(false));
        assert_eq!(field.arguments[4].value, InputValue::Float(1.5));
        assert_eq!(
            field.arguments[5].value,
            InputValue::Variable("id".to_string())
        );
    }

    #[test]
    fn test_fragments() {
        let document = parse(
            "query Q { hero { ...Details ... on Droid { primaryFunction } } } \
             fragment Details on Character { name }",
        )
        .unwrap();
        let op = document.operation("Q").unwrap();
        let Selection::Field(hero) = &op.selection_set.selections[0] else {
            panic!("expected field");
        };
        let selections = &hero.selection_set.as_ref().unwrap().selections;
        assert!(matches!(selections[0], Selection::FragmentSpread(_)));
        assert!(matches!(selections[1], Selection::InlineFragment(_)));

        let fragment = document.fragments().next().unwrap();
        assert_eq!(fragment.name, "Details");
        assert_eq!(fragment.type_condition, "Character");
    }

    #[test]
    fn test_directives() {
        let document = parse("query Q @cached { hero @include(if: $yes) }").unwrap();
        let op = document.operation("Q").unwrap();
        assert_eq!(op.directives[0].name, "cached");
        let Selection::Field(field) = &op.selection_set.selections[0] else {
            panic!("expected field");
        };
        assert_eq!(field.directives[0].name, "include");
        assert_eq!(field.directives[0].arguments[0].name, "if");
    }

    #[test]
    fn test_string_escapes() {
        let document = parse(r#"{ f(s: "tab\there A\n") }"#).unwrap();
        let op = document.operation("").unwrap();
        let Selection::Field(field) = &op.selection_set.selections[0] else {
            panic!("expected field");
        };
        assert_eq!(
            field.arguments[0].value,
            InputValue::String("tab\there A\n".to_string())
        );
    }

    #[test]
    fn test_block_string_dedent() {
        let document = parse("{ f(s: \"\"\"\n    hello\n      world\n\"\"\") }").unwrap();
        let op = document.operation("").unwrap();
        let Selection::Field(field) = &op.selection_set.selections[0] else {
            panic!("expected field");
        };
        assert_eq!(
            field.arguments[0].value,
            InputValue::String("hello\n  world".to_string())
        );
    }

    #[test]
    fn test_empty_document_fails() {
        assert!(parse("").is_err());
        assert!(parse("   # just a comment").is_err());
    }

    #[test]
    fn test_unbalanced_braces_fail() {
        assert!(parse("query {").is_err());
        assert!(parse("{ hero }}").is_err());
    }

    #[test]
    fn test_empty_selection_set_fails() {
        assert!(parse("{}").is_err());
        assert!(parse("query Q {}").is_err());
    }

    #[test]
    fn test_type_system_definitions_are_rejected() {
        let err = parse("type Query { hero: Hero }").unwrap_err();
        assert!(err.message.contains("expected an operation or fragment"));
    }

    #[test]
    fn test_variables_rejected_in_default_values() {
        assert!(parse("query Q($a: Int = $b) { f }").is_err());
    }

    #[test]
    fn test_error_carries_span() {
        let err = parse("query Q { a ").unwrap_err();
        assert!(err.span.start > 0);
        assert!(err.to_string().contains("at"));
    }
}

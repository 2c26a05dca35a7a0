//! [`Token`] — the immutable output of the tokenizer.

use crate::operator::Operator;
use crate::position::Position;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Section,
    Label,
    Identifier,
    Operator,
    Constant,
    Colon,
    Newline,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Annotation,
    Keyword,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Section => "section",
            TokenKind::Label => "label",
            TokenKind::Identifier => "identifier",
            TokenKind::Operator => "operator",
            TokenKind::Constant => "constant",
            TokenKind::Colon => "colon",
            TokenKind::Newline => "newline",
            TokenKind::LParen => "left parenthesis",
            TokenKind::RParen => "right parenthesis",
            TokenKind::LBrace => "left brace",
            TokenKind::RBrace => "right brace",
            TokenKind::Comma => "comma",
            TokenKind::Annotation => "annotation",
            TokenKind::Keyword => "keyword",
        }
    }
}

/// A single lexeme together with its source position. Tokens are produced
/// once by the tokenizer and never mutated afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
    /// Populated for `Operator` tokens whose lexeme names an expression
    /// operator (excludes `=`, `->`, the structural uses of `Operator` kind).
    pub operator: Option<Operator>,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Self {
        let lexeme = lexeme.into();
        let operator = if kind == TokenKind::Operator {
            Operator::from_lexeme(&lexeme)
        } else {
            None
        };
        Self {
            kind,
            lexeme,
            position,
            operator,
        }
    }

    /// A placeholder token used where the grammar calls for a position that
    /// has no real source location (e.g. synthetic parentheses).
    pub fn synthetic(kind: TokenKind, lexeme: impl Into<String>) -> Self {
        Self::new(kind, lexeme, Position::new(0, 0))
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(\"{}\") at {}",
            self.kind.name(),
            self.lexeme,
            self.position
        )
    }
}

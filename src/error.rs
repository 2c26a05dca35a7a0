//! Error types for every phase of the toolchain.
//!
//! Each phase gets its own `thiserror`-derived enum, grouped the way a caller
//! driving tokenize → parse → compile would want to match on them. Every
//! variant carries a [`Diagnostic`] with enough information to render a
//! source-pointing message.

use crate::position::Position;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// A fully-located, renderable error: a short machine tag, a human subtext,
/// a source position, and (when available) the offending line verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub tag: &'static str,
    pub subtext: String,
    pub position: Position,
    pub source_line: Option<String>,
}

impl Diagnostic {
    pub fn new(tag: &'static str, subtext: impl Into<String>, position: Position) -> Self {
        Self {
            tag,
            subtext: subtext.into(),
            position,
            source_line: None,
        }
    }

    pub fn with_source_line(mut self, line: impl Into<String>) -> Self {
        self.source_line = Some(line.into());
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.tag, self.position, self.subtext)?;
        if let Some(line) = &self.source_line {
            write!(f, "\n  {}", line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenizeError {
    #[error("{0}")]
    InvalidToken(Diagnostic),
    #[error("failed to open file: {0}")]
    FileOpen(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprParseError {
    #[error("{0}")]
    EmptyExpression(Diagnostic),
    #[error("{0}")]
    UnbalancedParen(Diagnostic),
    #[error("{0}")]
    IllegalAssignInExpr(Diagnostic),
    #[error("{0}")]
    UnexpectedToken(Diagnostic),
    #[error("{0}")]
    Syntax(Diagnostic),
    #[error("{0}")]
    UnknownOperator(Diagnostic),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SvParseError {
    #[error("{0}")]
    UnexpectedToken(Diagnostic),
    #[error("{0}")]
    ExpectedElementType(Diagnostic),
    #[error("{0}")]
    ExpectedElementName(Diagnostic),
    #[error("{0}")]
    RedundantAnnotation(Diagnostic),
    #[error("{0}")]
    MultipleAliases(Diagnostic),
    #[error("{0}")]
    BadAlias(Diagnostic),
    #[error("{0}")]
    UnknownAnnotation(Diagnostic),
    #[error("{0}")]
    UnknownOption(Diagnostic),
    #[error("{0}")]
    UnknownRegion(Diagnostic),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SvCompileError {
    #[error("{0}")]
    NullConfig(Diagnostic),
    #[error("{0}")]
    NullPointer(Diagnostic),
    #[error("{0}")]
    DuplicateRegion(Diagnostic),
    #[error("{0}")]
    DuplicateElement(Diagnostic),
    #[error("{0}")]
    EmptyRegion(Diagnostic),
    #[error("{0}")]
    UnknownType(Diagnostic),
    #[error("{0}")]
    Layout(Diagnostic),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SmParseError {
    #[error(transparent)]
    Expr(#[from] ExprParseError),
    #[error("{0}")]
    UnexpectedToken(Diagnostic),
    #[error("{0}")]
    ExpectedElementType(Diagnostic),
    #[error("{0}")]
    ExpectedElementName(Diagnostic),
    #[error("{0}")]
    ExpectedLabel(Diagnostic),
    #[error("{0}")]
    RedundantAnnotation(Diagnostic),
    #[error("{0}")]
    MultipleAliases(Diagnostic),
    #[error("{0}")]
    BadAlias(Diagnostic),
    #[error("{0}")]
    UnknownAnnotation(Diagnostic),
    #[error("{0}")]
    MultipleSvSections(Diagnostic),
    #[error("{0}")]
    MultipleLocalSections(Diagnostic),
    #[error("{0}")]
    NameDuplication(Diagnostic),
    #[error("{0}")]
    ReservedName(Diagnostic),
    #[error("{0}")]
    ExpectedAssign(Diagnostic),
    #[error("{0}")]
    ExpectedInitValue(Diagnostic),
    #[error("{0}")]
    ExpectedDestState(Diagnostic),
    #[error("{0}")]
    JunkAfterTransition(Diagnostic),
    #[error("{0}")]
    ExpectedActionOrTransition(Diagnostic),
    #[error("{0}")]
    UnbalancedBrace(Diagnostic),
    #[error("{0}")]
    EmptyElse(Diagnostic),
    #[error("{0}")]
    UnexpectedEof(Diagnostic),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprCompileError {
    #[error("{0}")]
    NullParse(Diagnostic),
    #[error("{0}")]
    TypeMismatch(Diagnostic),
    #[error("{0}")]
    MismatchedOperands(Diagnostic),
    #[error("{0}")]
    UnknownElement(Diagnostic),
    #[error("{0}")]
    NullElementBinding(Diagnostic),
    #[error("{0}")]
    NumericOverflow(Diagnostic),
    #[error("{0}")]
    InvalidNumericConstant(Diagnostic),
    #[error("{0}")]
    FunctionArity(Diagnostic),
    #[error("{0}")]
    UnknownFunction(Diagnostic),
    #[error("{0}")]
    BadWindowSize(Diagnostic),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SmCompileError {
    #[error(transparent)]
    Expr(#[from] ExprCompileError),
    #[error(transparent)]
    SvCompile(#[from] SvCompileError),
    #[error("{0}")]
    InitStateUnknown(Diagnostic),
    #[error("{0}")]
    TransitionUnknown(Diagnostic),
    #[error("{0}")]
    TransitionInExit(Diagnostic),
    #[error("{0}")]
    AssignmentToReadOnly(Diagnostic),
    #[error("{0}")]
    UseBeforeInit(Diagnostic),
    #[error("{0}")]
    NoGlobalTime(Diagnostic),
    #[error("{0}")]
    NoStateTime(Diagnostic),
    #[error("{0}")]
    NoStateId(Diagnostic),
    #[error("{0}")]
    LocalSvCrossRef(Diagnostic),
    #[error("{0}")]
    IllegalAssertion(Diagnostic),
    #[error("{0}")]
    IllegalStop(Diagnostic),
    #[error("{0}")]
    ReservedStateName(Diagnostic),
    #[error("{0}")]
    TypeMismatchInSv(Diagnostic),
    #[error("{0}")]
    SvElementUnknown(Diagnostic),
}

/// Errors produced while running a compiled [`crate::runtime::StateVector`] or
/// [`crate::sm::runtime::StateMachine`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("state vector used before initialization")]
    Uninitialized,
    #[error("state vector already initialized")]
    Reinit,
    #[error("state vector has no regions")]
    Empty,
    #[error("unknown current state")]
    State,
    #[error("unknown transition destination state")]
    Trans,
    #[error("transition attempted from an exit label")]
    TrExit,
    #[error("global time did not advance")]
    Time,
    #[error("unknown element or region name: {0}")]
    Key(String),
    #[error("type mismatch accessing element {0}")]
    Type(String),
}

/// Unifies every phase error for callers driving the whole pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurefireError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    ExprParse(#[from] ExprParseError),
    #[error(transparent)]
    ExprCompile(#[from] ExprCompileError),
    #[error(transparent)]
    SvParse(#[from] SvParseError),
    #[error(transparent)]
    SvCompile(#[from] SvCompileError),
    #[error(transparent)]
    SmParse(#[from] SmParseError),
    #[error(transparent)]
    SmCompile(#[from] SmCompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display_includes_position_and_subtext() {
        let d = Diagnostic::new("invalid token", "unexpected `$`", Position::new(3, 5));
        assert_eq!(format!("{d}"), "invalid token (3:5): unexpected `$`");
    }

    #[test]
    fn diagnostic_display_includes_source_line_when_present() {
        let d = Diagnostic::new("invalid token", "unexpected `$`", Position::new(1, 1))
            .with_source_line("$ bad line");
        assert_eq!(
            format!("{d}"),
            "invalid token (1:1): unexpected `$`\n  $ bad line"
        );
    }
}

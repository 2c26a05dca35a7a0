//! Expression parsing and compilation: infix token slice → arena parse tree
//! → directly-evaluable compiled tree bound to state vector elements.

pub mod compile;
pub mod parse;

pub use compile::{compile, CompiledExpression};
pub use parse::{parse as parse_expression, ExprNode, ExpressionParse};

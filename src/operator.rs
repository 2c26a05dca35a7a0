//! [`Operator`] — the closed set of expression operators and their
//! shunting-yard metadata (precedence, arity, arithmeticity).

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Whether an operator (or operand) deals in numbers or in truth values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmeticity {
    Arithmetic,
    Logical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Not,
    Mult,
    Div,
    Add,
    Sub,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    And,
    Or,
}

/// Static metadata for one operator, mirroring the original's `OperatorInfo`.
#[derive(Debug, Clone, Copy)]
pub struct OperatorInfo {
    pub op: Operator,
    pub lexeme: &'static str,
    /// Higher binds tighter.
    pub precedence: u8,
    pub unary: bool,
    /// Whether this operator is classified as arithmetic (vs. logical) for
    /// the purpose of [`OperatorInfo::accepts`].
    pub result: Arithmeticity,
    /// Arithmeticity its operand(s) must have.
    pub operand: Arithmeticity,
}

impl Operator {
    pub fn info(self) -> &'static OperatorInfo {
        &OPERATORS[self as usize]
    }

    pub fn lexeme(self) -> &'static str {
        self.info().lexeme
    }

    pub fn precedence(self) -> u8 {
        self.info().precedence
    }

    pub fn is_unary(self) -> bool {
        self.info().unary
    }

    /// Relational operators share one precedence tier and right-associate,
    /// which is what makes double-inequality expansion well-defined.
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
        )
    }

    pub fn from_lexeme(lexeme: &str) -> Option<Self> {
        LEXEME_TO_OP.get(lexeme).copied()
    }
}

const ALL: [Operator; 13] = [
    Operator::Not,
    Operator::Mult,
    Operator::Div,
    Operator::Add,
    Operator::Sub,
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
    Operator::Eq,
    Operator::Neq,
    Operator::And,
    Operator::Or,
];

static OPERATORS: Lazy<[OperatorInfo; 13]> = Lazy::new(|| {
    use Arithmeticity::*;
    [
        OperatorInfo {
            op: Operator::Not,
            lexeme: "not",
            precedence: 7,
            unary: true,
            result: Logical,
            operand: Logical,
        },
        OperatorInfo {
            op: Operator::Mult,
            lexeme: "*",
            precedence: 6,
            unary: false,
            result: Arithmetic,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Div,
            lexeme: "/",
            precedence: 6,
            unary: false,
            result: Arithmetic,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Add,
            lexeme: "+",
            precedence: 5,
            unary: false,
            result: Arithmetic,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Sub,
            lexeme: "-",
            precedence: 5,
            unary: false,
            result: Arithmetic,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Lt,
            lexeme: "<",
            precedence: 4,
            unary: false,
            result: Logical,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Lte,
            lexeme: "<=",
            precedence: 4,
            unary: false,
            result: Logical,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Gt,
            lexeme: ">",
            precedence: 4,
            unary: false,
            result: Logical,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Gte,
            lexeme: ">=",
            precedence: 4,
            unary: false,
            result: Logical,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Eq,
            lexeme: "==",
            precedence: 3,
            unary: false,
            result: Logical,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::Neq,
            lexeme: "!=",
            precedence: 3,
            unary: false,
            result: Logical,
            operand: Arithmetic,
        },
        OperatorInfo {
            op: Operator::And,
            lexeme: "and",
            precedence: 2,
            unary: false,
            result: Logical,
            operand: Logical,
        },
        OperatorInfo {
            op: Operator::Or,
            lexeme: "or",
            precedence: 1,
            unary: false,
            result: Logical,
            operand: Logical,
        },
    ]
});

static LEXEME_TO_OP: Lazy<HashMap<&'static str, Operator>> =
    Lazy::new(|| ALL.iter().map(|op| (op.lexeme(), *op)).collect());

/// Operator lexemes that are structural tokens (kind `Operator`) but are not
/// expression operators — `=` (assignment) and `->` (transition).
pub static NON_EXPRESSION_OPERATOR_LEXEMES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["=", "->", "!"].into_iter().collect());

//! Expression compilation: a type-checked parse tree → an arena of
//! directly-evaluable nodes bound to live state vector elements.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::error::{Diagnostic, ExprCompileError};
use crate::expr::parse::ExpressionParse;
use crate::operator::{Arithmeticity, Operator};
use crate::position::Position;
use crate::runtime::element::ElementAccess;
use crate::token::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RollFn {
    Avg,
    Median,
    Min,
    Max,
    Range,
}

static ROLL_FUNCTIONS: Lazy<HashMap<&'static str, RollFn>> = Lazy::new(|| {
    [
        ("roll_avg", RollFn::Avg),
        ("roll_median", RollFn::Median),
        ("roll_min", RollFn::Min),
        ("roll_max", RollFn::Max),
        ("roll_range", RollFn::Range),
    ]
    .into_iter()
    .collect()
});

/// A maximum window size keeps a misconfigured expression from allocating an
/// unbounded ring buffer at runtime.
const MAX_WINDOW_SIZE: i64 = 100_000;

enum CompiledNode {
    Const(f64),
    Element(Rc<dyn ElementAccess>),
    Unary {
        op: Operator,
        operand: usize,
    },
    Binary {
        op: Operator,
        left: usize,
        right: usize,
    },
    Roll {
        func: RollFn,
        operand: usize,
        window: usize,
        history: RefCell<VecDeque<f64>>,
    },
}

/// A compiled expression: a direct-threaded tree of [`CompiledNode`]s that
/// can be evaluated repeatedly without revisiting the parse tree or
/// re-resolving element names.
pub struct CompiledExpression {
    nodes: Vec<CompiledNode>,
    root: usize,
    pub result_type: Arithmeticity,
}

impl CompiledExpression {
    pub fn evaluate(&self) -> f64 {
        self.eval(self.root)
    }

    fn eval(&self, idx: usize) -> f64 {
        match &self.nodes[idx] {
            CompiledNode::Const(v) => *v,
            CompiledNode::Element(el) => el.read_f64(),
            CompiledNode::Unary { op, operand } => {
                let v = self.eval(*operand);
                match op {
                    Operator::Not => bool_to_f64(!is_truthy(v)),
                    other => unreachable!("{other:?} is not a unary operator"),
                }
            }
            CompiledNode::Binary { op, left, right } => {
                let l = self.eval(*left);
                let r = self.eval(*right);
                match op {
                    Operator::Add => l + r,
                    Operator::Sub => l - r,
                    Operator::Mult => l * r,
                    Operator::Div => l / r,
                    Operator::Lt => bool_to_f64(l < r),
                    Operator::Lte => bool_to_f64(l <= r),
                    Operator::Gt => bool_to_f64(l > r),
                    Operator::Gte => bool_to_f64(l >= r),
                    Operator::Eq => bool_to_f64(l == r),
                    Operator::Neq => bool_to_f64(l != r),
                    Operator::And => bool_to_f64(is_truthy(l) && is_truthy(r)),
                    Operator::Or => bool_to_f64(is_truthy(l) || is_truthy(r)),
                    Operator::Not => unreachable!("Not is not a binary operator"),
                }
            }
            CompiledNode::Roll { func, history, .. } => {
                let hist = history.borrow();
                if hist.is_empty() {
                    0.0
                } else {
                    roll_stat(*func, &hist)
                }
            }
        }
    }

    /// Push a fresh sample into every rolling-statistics node's window. Must
    /// be called once per state-machine step regardless of whether this
    /// expression's guard or action actually runs that step — the original
    /// updates every registered stat unconditionally before running the
    /// entry/step chain.
    pub fn update_rolling_stats(&self) {
        for node in &self.nodes {
            if let CompiledNode::Roll { operand, window, history, .. } = node {
                let v = self.eval(*operand);
                let mut hist = history.borrow_mut();
                hist.push_back(v);
                while hist.len() > *window {
                    hist.pop_front();
                }
            }
        }
    }
}

fn is_truthy(v: f64) -> bool {
    !(v == 0.0 || v.is_nan())
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn roll_stat(func: RollFn, hist: &VecDeque<f64>) -> f64 {
    match func {
        RollFn::Avg => hist.iter().sum::<f64>() / hist.len() as f64,
        RollFn::Min => hist.iter().copied().fold(f64::INFINITY, f64::min),
        RollFn::Max => hist.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        RollFn::Range => {
            let min = hist.iter().copied().fold(f64::INFINITY, f64::min);
            let max = hist.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            max - min
        }
        RollFn::Median => {
            let mut sorted: Vec<f64> = hist.iter().copied().collect();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n = sorted.len();
            if n % 2 == 1 {
                sorted[n / 2]
            } else {
                (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
            }
        }
    }
}

/// Compile `parse`, resolving identifiers to live elements through
/// `resolve`, and type-check the root against the caller's requested
/// `expected` arithmeticity (arithmetic expression vs. logical/predicate
/// expression) — the same expression parsed two ways (once per requested
/// arithmeticity) either compiles once and rejects the other, or vice versa.
pub fn compile(
    parse: &ExpressionParse,
    resolve: &dyn Fn(&str) -> Option<Rc<dyn ElementAccess>>,
    expected: Arithmeticity,
) -> Result<CompiledExpression, ExprCompileError> {
    let mut nodes = Vec::new();
    let (root, result_type) = compile_node(parse, parse.root_index(), &mut nodes, resolve)?;
    if result_type != expected {
        return Err(ExprCompileError::TypeMismatch(Diagnostic::new(
            "type mismatch",
            format!("expected a {expected:?} expression, found a {result_type:?} expression"),
            parse.node(parse.root_index()).token.position,
        )));
    }
    Ok(CompiledExpression {
        nodes,
        root,
        result_type,
    })
}

fn compile_node(
    parse: &ExpressionParse,
    idx: usize,
    nodes: &mut Vec<CompiledNode>,
    resolve: &dyn Fn(&str) -> Option<Rc<dyn ElementAccess>>,
) -> Result<(usize, Arithmeticity), ExprCompileError> {
    let node = parse.node(idx);

    if node.is_func {
        return compile_call(parse, idx, nodes, resolve);
    }

    match node.token.kind {
        TokenKind::Constant => {
            let v = parse_constant(&node.token.lexeme, node.token.position)?;
            let ty = if node.token.lexeme == "true" || node.token.lexeme == "false" {
                Arithmeticity::Logical
            } else {
                Arithmeticity::Arithmetic
            };
            nodes.push(CompiledNode::Const(v));
            Ok((nodes.len() - 1, ty))
        }
        TokenKind::Identifier => {
            let el = resolve(&node.token.lexeme).ok_or_else(|| {
                ExprCompileError::UnknownElement(Diagnostic::new(
                    "unknown element",
                    format!("`{}` is not a state vector element", node.token.lexeme),
                    node.token.position,
                ))
            })?;
            let ty = if el.primitive_type() == crate::primitive::PrimitiveType::Bool {
                Arithmeticity::Logical
            } else {
                Arithmeticity::Arithmetic
            };
            nodes.push(CompiledNode::Element(el));
            Ok((nodes.len() - 1, ty))
        }
        TokenKind::Operator => {
            let op = node.token.operator.ok_or_else(|| {
                ExprCompileError::TypeMismatch(Diagnostic::new(
                    "unknown operator",
                    format!("`{}` has no expression meaning", node.token.lexeme),
                    node.token.position,
                ))
            })?;
            let info = op.info();

            if info.unary {
                let right = node.right.ok_or_else(|| {
                    ExprCompileError::MismatchedOperands(Diagnostic::new(
                        "missing operand",
                        format!("`{}` expects one operand", node.token.lexeme),
                        node.token.position,
                    ))
                })?;
                let (operand, operand_ty) = compile_node(parse, right, nodes, resolve)?;
                expect_arithmeticity(info.operand, operand_ty, &node.token.lexeme, node.token.position)?;
                nodes.push(CompiledNode::Unary { op, operand });
                Ok((nodes.len() - 1, info.result))
            } else {
                let left_idx = node.left.ok_or_else(|| {
                    ExprCompileError::MismatchedOperands(Diagnostic::new(
                        "missing operand",
                        format!("`{}` expects a left operand", node.token.lexeme),
                        node.token.position,
                    ))
                })?;
                let right_idx = node.right.ok_or_else(|| {
                    ExprCompileError::MismatchedOperands(Diagnostic::new(
                        "missing operand",
                        format!("`{}` expects a right operand", node.token.lexeme),
                        node.token.position,
                    ))
                })?;
                let (left, left_ty) = compile_node(parse, left_idx, nodes, resolve)?;
                let (right, right_ty) = compile_node(parse, right_idx, nodes, resolve)?;
                expect_arithmeticity(info.operand, left_ty, &node.token.lexeme, node.token.position)?;
                expect_arithmeticity(info.operand, right_ty, &node.token.lexeme, node.token.position)?;
                nodes.push(CompiledNode::Binary { op, left, right });
                Ok((nodes.len() - 1, info.result))
            }
        }
        other => Err(ExprCompileError::TypeMismatch(Diagnostic::new(
            "unexpected node",
            format!("`{}` ({}) cannot appear in a compiled expression", node.token.lexeme, other.name()),
            node.token.position,
        ))),
    }
}

fn expect_arithmeticity(
    expected: Arithmeticity,
    actual: Arithmeticity,
    lexeme: &str,
    position: Position,
) -> Result<(), ExprCompileError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ExprCompileError::TypeMismatch(Diagnostic::new(
            "type mismatch",
            format!("`{lexeme}` expects a {expected:?} operand, found {actual:?}"),
            position,
        )))
    }
}

fn parse_constant(lexeme: &str, position: Position) -> Result<f64, ExprCompileError> {
    match lexeme {
        "true" => Ok(1.0),
        "false" => Ok(0.0),
        _ => lexeme.parse::<f64>().map_err(|_| {
            ExprCompileError::InvalidNumericConstant(Diagnostic::new(
                "invalid numeric constant",
                format!("`{lexeme}` is not a valid number"),
                position,
            ))
        }),
    }
}

/// Walk a function call's synthetic argument chain and return the argument
/// parse-node indices in source order.
fn collect_call_args(parse: &ExpressionParse, func_idx: usize) -> Vec<usize> {
    let mut args = Vec::new();
    let mut cur = parse.node(func_idx).left;
    while let Some(shell) = cur {
        let shell_node = parse.node(shell);
        if let Some(arg) = shell_node.right {
            args.push(arg);
        }
        cur = shell_node.left;
    }
    args
}

fn compile_call(
    parse: &ExpressionParse,
    idx: usize,
    nodes: &mut Vec<CompiledNode>,
    resolve: &dyn Fn(&str) -> Option<Rc<dyn ElementAccess>>,
) -> Result<(usize, Arithmeticity), ExprCompileError> {
    let node = parse.node(idx);
    let name = node.token.lexeme.as_str();
    let func = *ROLL_FUNCTIONS.get(name).ok_or_else(|| {
        ExprCompileError::UnknownFunction(Diagnostic::new(
            "unknown function",
            format!("`{name}` is not a recognized function"),
            node.token.position,
        ))
    })?;

    let args = collect_call_args(parse, idx);
    if args.len() != 2 {
        return Err(ExprCompileError::FunctionArity(Diagnostic::new(
            "wrong number of arguments",
            format!("`{name}` takes 2 arguments (expression, window size), found {}", args.len()),
            node.token.position,
        )));
    }

    let window_node = parse.node(args[1]);
    if window_node.token.kind != TokenKind::Constant {
        return Err(ExprCompileError::BadWindowSize(Diagnostic::new(
            "invalid window size",
            "window size must be a constant integer literal",
            window_node.token.position,
        )));
    }
    let window_val: i64 = window_node.token.lexeme.parse().map_err(|_| {
        ExprCompileError::BadWindowSize(Diagnostic::new(
            "invalid window size",
            format!("`{}` is not an integer", window_node.token.lexeme),
            window_node.token.position,
        ))
    })?;
    if window_val < 1 || window_val > MAX_WINDOW_SIZE {
        return Err(ExprCompileError::BadWindowSize(Diagnostic::new(
            "invalid window size",
            format!("window size must be between 1 and {MAX_WINDOW_SIZE}, found {window_val}"),
            window_node.token.position,
        )));
    }

    let (operand, operand_ty) = compile_node(parse, args[0], nodes, resolve)?;
    expect_arithmeticity(Arithmeticity::Arithmetic, operand_ty, name, node.token.position)?;

    nodes.push(CompiledNode::Roll {
        func,
        operand,
        window: window_val as usize,
        history: RefCell::new(VecDeque::with_capacity(window_val as usize)),
    });
    Ok((nodes.len() - 1, Arithmeticity::Arithmetic))
}

//! Expression parsing: token slice → arena-indexed parse tree.
//!
//! The tree is a `Vec<ExprNode>` addressed by index rather than a boxed tree,
//! so that double-inequality expansion can share a subtree between two
//! parents instead of cloning it (`a < b < c` becomes `(a < b) and (b < c)`
//! with the `b` subtree referenced from both sides, not duplicated).

use crate::error::{Diagnostic, ExprParseError};
use crate::operator::Operator;
use crate::token::{Token, TokenKind};

/// One node of an expression parse tree. Leaves (identifiers, constants) have
/// no children. Unary operators and function-argument links use `right`
/// only. A function-call node's `left` chains through synthetic argument
/// nodes whose own `right` holds each argument's subtree.
#[derive(Debug, Clone)]
pub struct ExprNode {
    pub token: Token,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub is_func: bool,
}

/// An arena of [`ExprNode`]s with a designated root.
#[derive(Debug, Clone)]
pub struct ExpressionParse {
    nodes: Vec<ExprNode>,
    root: usize,
}

impl ExpressionParse {
    pub fn node(&self, i: usize) -> &ExprNode {
        &self.nodes[i]
    }

    pub fn root_index(&self) -> usize {
        self.root
    }

    pub fn root(&self) -> &ExprNode {
        &self.nodes[self.root]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Parse a fully-tokenized expression (no leading/trailing newlines, no
/// assignment token) into a tree.
pub fn parse(tokens: &[Token]) -> Result<ExpressionParse, ExprParseError> {
    if tokens.is_empty() {
        return Err(ExprParseError::EmptyExpression(Diagnostic::new(
            "empty expression",
            "expected an expression here",
            crate::position::Position::new(0, 0),
        )));
    }

    check_balanced_parens(tokens)?;

    for tok in tokens {
        if tok.kind == TokenKind::Operator && tok.lexeme == "=" {
            return Err(ExprParseError::IllegalAssignInExpr(Diagnostic::new(
                "illegal assignment",
                "`=` is not allowed inside an expression",
                tok.position,
            )));
        }
        if !matches!(
            tok.kind,
            TokenKind::Identifier | TokenKind::Constant | TokenKind::Operator | TokenKind::LParen | TokenKind::RParen | TokenKind::Comma
        ) {
            return Err(ExprParseError::UnexpectedToken(Diagnostic::new(
                "unexpected token",
                format!("`{}` may not appear in an expression", tok.lexeme),
                tok.position,
            )));
        }
    }

    let mut arena = Vec::new();
    let root = parse_impl(tokens, &mut arena)?;
    expand_double_ineq(&mut arena, root);
    Ok(ExpressionParse { nodes: arena, root })
}

fn check_balanced_parens(tokens: &[Token]) -> Result<(), ExprParseError> {
    let mut level: i32 = 0;
    for tok in tokens {
        match tok.kind {
            TokenKind::LParen => level += 1,
            TokenKind::RParen => {
                level -= 1;
                if level < 0 {
                    return Err(ExprParseError::UnbalancedParen(Diagnostic::new(
                        "unbalanced parenthesis",
                        "unmatched `)`",
                        tok.position,
                    )));
                }
            }
            _ => {}
        }
    }
    if level != 0 {
        return Err(ExprParseError::UnbalancedParen(Diagnostic::new(
            "unbalanced parenthesis",
            "unmatched `(`",
            tokens[0].position,
        )));
    }
    Ok(())
}

/// Shunting-yard over `tokens`, wrapped in a synthetic pair of parentheses so
/// the trailing pop loop is just "pop until the opening paren," same as any
/// nested group.
fn parse_impl(tokens: &[Token], arena: &mut Vec<ExprNode>) -> Result<usize, ExprParseError> {
    let mut wrapped: Vec<Token> = Vec::with_capacity(tokens.len() + 2);
    wrapped.push(Token::synthetic(TokenKind::LParen, "("));
    wrapped.extend_from_slice(tokens);
    wrapped.push(Token::synthetic(TokenKind::RParen, ")"));

    let mut node_stack: Vec<usize> = Vec::new();
    let mut op_stack: Vec<Token> = Vec::new();

    let mut i = 0usize;
    while i < wrapped.len() {
        let tok = &wrapped[i];
        match tok.kind {
            TokenKind::LParen => op_stack.push(tok.clone()),
            TokenKind::Identifier | TokenKind::Constant => {
                if tok.kind == TokenKind::Identifier
                    && i + 1 < wrapped.len()
                    && wrapped[i + 1].kind == TokenKind::LParen
                {
                    let j = matching_rparen(&wrapped, i + 1)?;
                    let func_idx = parse_function_call(&wrapped[i..=j], arena)?;
                    node_stack.push(func_idx);
                    i = j;
                } else {
                    arena.push(ExprNode {
                        token: tok.clone(),
                        left: None,
                        right: None,
                        is_func: false,
                    });
                    node_stack.push(arena.len() - 1);
                }
            }
            TokenKind::Operator => {
                let op_info = tok.operator.ok_or_else(|| {
                    ExprParseError::UnknownOperator(Diagnostic::new(
                        "unknown operator",
                        format!("`{}` is not a valid expression operator", tok.lexeme),
                        tok.position,
                    ))
                })?;
                while let Some(top) = op_stack.last() {
                    if top.kind != TokenKind::Operator {
                        break;
                    }
                    let top_op = top.operator.ok_or_else(|| {
                        ExprParseError::UnknownOperator(Diagnostic::new(
                            "unknown operator",
                            format!("`{}` is not a valid expression operator", top.lexeme),
                            top.position,
                        ))
                    })?;
                    let left_assoc = top_op.is_unary() && op_info.is_unary();
                    let should_pop = if left_assoc {
                        top_op.precedence() > op_info.precedence()
                    } else {
                        top_op.precedence() >= op_info.precedence()
                    };
                    if !should_pop {
                        break;
                    }
                    pop_subexpression(&mut op_stack, &mut node_stack, arena)?;
                }
                op_stack.push(tok.clone());
            }
            TokenKind::RParen => {
                while op_stack.last().map(|t| t.kind) != Some(TokenKind::LParen) {
                    if op_stack.is_empty() {
                        return Err(ExprParseError::Syntax(Diagnostic::new(
                            "syntax error",
                            "unmatched `)`",
                            tok.position,
                        )));
                    }
                    pop_subexpression(&mut op_stack, &mut node_stack, arena)?;
                }
                op_stack.pop();
            }
            _ => {
                return Err(ExprParseError::UnexpectedToken(Diagnostic::new(
                    "unexpected token",
                    format!("`{}` may not appear in an expression", tok.lexeme),
                    tok.position,
                )));
            }
        }
        i += 1;
    }

    if !op_stack.is_empty() {
        return Err(ExprParseError::Syntax(Diagnostic::new(
            "syntax error",
            "unbalanced operator stack",
            op_stack.last().unwrap().position,
        )));
    }
    match node_stack.len() {
        0 => Err(ExprParseError::EmptyExpression(Diagnostic::new(
            "empty expression",
            "expected an expression here",
            tokens[0].position,
        ))),
        1 => Ok(node_stack[0]),
        _ => Err(ExprParseError::Syntax(Diagnostic::new(
            "syntax error",
            "multiple expressions without an operator between them",
            arena[node_stack[1]].token.position,
        ))),
    }
}

/// Find the index (within `wrapped`) of the `)` matching the `(` at `open`.
fn matching_rparen(wrapped: &[Token], open: usize) -> Result<usize, ExprParseError> {
    let mut level = 0i32;
    let mut i = open;
    while i < wrapped.len() {
        match wrapped[i].kind {
            TokenKind::LParen => level += 1,
            TokenKind::RParen => {
                level -= 1;
                if level == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(ExprParseError::UnbalancedParen(Diagnostic::new(
        "unbalanced parenthesis",
        "unmatched `(`",
        wrapped[open].position,
    )))
}

fn pop_subexpression(
    op_stack: &mut Vec<Token>,
    node_stack: &mut Vec<usize>,
    arena: &mut Vec<ExprNode>,
) -> Result<(), ExprParseError> {
    let op = op_stack.pop().expect("caller checked op_stack is non-empty");
    let op_info = op.operator.ok_or_else(|| {
        ExprParseError::Syntax(Diagnostic::new("syntax error", "expected an operator here", op.position))
    })?;

    let right = node_stack.pop().ok_or_else(|| {
        ExprParseError::Syntax(Diagnostic::new(
            "syntax error",
            format!("`{}` is missing an operand", op.lexeme),
            op.position,
        ))
    })?;
    if arena[right].token.position < op.position {
        return Err(ExprParseError::Syntax(Diagnostic::new(
            "syntax error",
            format!("`{}` is missing an operand", op.lexeme),
            op.position,
        )));
    }

    let left = if op_info.is_unary() {
        None
    } else {
        Some(node_stack.pop().ok_or_else(|| {
            ExprParseError::Syntax(Diagnostic::new(
                "syntax error",
                format!("`{}` is missing its left operand", op.lexeme),
                op.position,
            ))
        })?)
    };

    arena.push(ExprNode {
        token: op,
        left,
        right: Some(right),
        is_func: false,
    });
    node_stack.push(arena.len() - 1);
    Ok(())
}

/// `fc` is `ident ( arg, arg, ... )` as a single slice, `fc[0]` the name and
/// `fc.last()` the closing paren.
fn parse_function_call(fc: &[Token], arena: &mut Vec<ExprNode>) -> Result<usize, ExprParseError> {
    let last = fc.len() - 1;
    let mut arg_slices: Vec<(usize, usize)> = Vec::new();
    let mut level: i32 = 0;
    let mut arg_start = 2usize;
    let mut idx = 2usize;

    while idx < fc.len() {
        match fc[idx].kind {
            TokenKind::LParen => level += 1,
            TokenKind::RParen if idx != last => level -= 1,
            _ => {}
        }
        if level == 0 && (fc[idx].kind == TokenKind::Comma || idx == last) {
            let empty_arg = idx == arg_start;
            let is_empty_call = arg_start == 2 && idx == last;
            if empty_arg && !is_empty_call {
                return Err(ExprParseError::Syntax(Diagnostic::new(
                    "syntax error",
                    "empty function argument",
                    fc[idx].position,
                )));
            }
            if !empty_arg {
                arg_slices.push((arg_start, idx));
                arg_start = idx + 1;
            }
        }
        idx += 1;
    }

    let func_idx = arena.len();
    arena.push(ExprNode {
        token: fc[0].clone(),
        left: None,
        right: None,
        is_func: true,
    });

    let mut cur = func_idx;
    for (lo, hi) in arg_slices {
        let arg_root = parse_impl(&fc[lo..hi], arena)?;
        let shell_idx = arena.len();
        arena.push(ExprNode {
            token: Token::synthetic(TokenKind::Comma, "(arg)"),
            left: None,
            right: Some(arg_root),
            is_func: false,
        });
        arena[cur].left = Some(shell_idx);
        cur = shell_idx;
    }

    Ok(func_idx)
}

/// Rewrite `a < b < c` (a chain of two relational operators sharing operand
/// `b`) into `(a < b) and (b < c)`, recursively over the whole tree. `b`'s
/// subtree is referenced from both halves rather than cloned.
fn expand_double_ineq(arena: &mut Vec<ExprNode>, idx: usize) {
    let left = arena[idx].left;
    let right = arena[idx].right;

    if let (Some(l), Some(r)) = (left, right) {
        let this_is_rel = arena[idx].token.operator.map_or(false, |o| o.is_relational());
        let left_is_rel = arena[l].token.operator.map_or(false, |o| o.is_relational());
        if this_is_rel && left_is_rel {
            let b = arena[l].right;
            let op_token = arena[idx].token.clone();
            let new_right = arena.len();
            arena.push(ExprNode {
                token: op_token,
                left: b,
                right: Some(r),
                is_func: false,
            });
            let position = arena[idx].token.position;
            arena[idx].token = Token::new(TokenKind::Operator, "and", position);
            arena[idx].right = Some(new_right);
        }
    }

    let left = arena[idx].left;
    let right = arena[idx].right;
    if let Some(l) = left {
        expand_double_ineq(arena, l);
    }
    if let Some(r) = right {
        expand_double_ineq(arena, r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse_str(src: &str) -> ExpressionParse {
        let toks = tokenize(src).unwrap();
        let toks: Vec<Token> = toks.into_iter().filter(|t| t.kind != TokenKind::Newline).collect();
        parse(&toks).unwrap()
    }

    #[test]
    fn single_identifier() {
        let p = parse_str("x");
        assert_eq!(p.root().token.lexeme, "x");
    }

    #[test]
    fn precedence_binds_mult_before_add() {
        let p = parse_str("1 + 2 * 3");
        let root = p.root();
        assert_eq!(root.token.lexeme, "+");
        let right = p.node(root.right.unwrap());
        assert_eq!(right.token.lexeme, "*");
    }

    #[test]
    fn parens_override_precedence() {
        let p = parse_str("(1 + 2) * 3");
        assert_eq!(p.root().token.lexeme, "*");
        let left = p.node(p.root().left.unwrap());
        assert_eq!(left.token.lexeme, "+");
    }

    #[test]
    fn unary_not_binds_tighter_than_and() {
        let p = parse_str("not a and b");
        assert_eq!(p.root().token.lexeme, "and");
        let left = p.node(p.root().left.unwrap());
        assert_eq!(left.token.lexeme, "not");
        assert!(left.left.is_none());
    }

    #[test]
    fn double_inequality_expands_to_and_sharing_middle_operand() {
        let p = parse_str("a < b < c");
        let root = p.root();
        assert_eq!(root.token.lexeme, "and");
        let left = p.node(root.left.unwrap());
        let right = p.node(root.right.unwrap());
        assert_eq!(left.token.lexeme, "<");
        assert_eq!(right.token.lexeme, "<");
        assert_eq!(p.node(left.right.unwrap()).token.lexeme, "b");
        assert_eq!(p.node(right.left.unwrap()).token.lexeme, "b");
        assert_eq!(left.right, right.left);
    }

    #[test]
    fn function_call_with_two_arguments() {
        let p = parse_str("roll_avg(x, 10)");
        let root = p.root();
        assert!(root.is_func);
        assert_eq!(root.token.lexeme, "roll_avg");
        let shell1 = p.node(root.left.unwrap());
        assert_eq!(p.node(shell1.right.unwrap()).token.lexeme, "x");
        let shell2 = p.node(shell1.left.unwrap());
        assert_eq!(p.node(shell2.right.unwrap()).token.lexeme, "10");
    }

    #[test]
    fn function_call_with_no_arguments() {
        let p = parse_str("now()");
        assert!(p.root().is_func);
        assert!(p.root().left.is_none());
    }

    #[test]
    fn assignment_token_is_rejected() {
        let toks = tokenize("x = 1").unwrap();
        let err = parse(&toks).unwrap_err();
        assert!(matches!(err, ExprParseError::IllegalAssignInExpr(_)));
    }

    #[test]
    fn unbalanced_paren_is_rejected() {
        let toks = tokenize("(1 + 2").unwrap();
        let err = parse(&toks).unwrap_err();
        assert!(matches!(err, ExprParseError::UnbalancedParen(_)));
    }

    #[test]
    fn empty_expression_is_rejected() {
        let err = parse(&[]).unwrap_err();
        assert!(matches!(err, ExprParseError::EmptyExpression(_)));
    }

    #[test]
    fn trailing_unary_operator_with_no_right_operand_is_rejected() {
        let toks = tokenize("a not").unwrap();
        let toks: Vec<Token> = toks.into_iter().filter(|t| t.kind != TokenKind::Newline).collect();
        let err = parse(&toks).unwrap_err();
        assert!(matches!(err, ExprParseError::Syntax(_)));
    }
}

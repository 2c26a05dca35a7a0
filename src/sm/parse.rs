//! State-machine config parsing: token sequence → state/label/block/action
//! parse tree.

use crate::cursor::TokenCursor;
use crate::error::{Diagnostic, ExprParseError, SmParseError};
use crate::expr::parse_expression;
use crate::token::{Token, TokenKind};

pub const RESERVED_NAMES: [&str; 3] = ["T", "G", "S"];

#[derive(Debug, Clone)]
pub struct SvElementParse {
    pub type_token: Token,
    pub name_token: Token,
    pub read_only: bool,
    pub alias: Option<Token>,
}

#[derive(Debug, Clone)]
pub struct LocalElementParse {
    pub type_token: Token,
    pub name_token: Token,
    pub init_tokens: Vec<Token>,
    pub read_only: bool,
}

#[derive(Debug, Clone)]
pub enum ActionParse {
    Assign { lhs: Token, rhs_tokens: Vec<Token> },
    Transition { dest: Token },
}

#[derive(Debug, Clone, Default)]
pub struct BlockParse {
    pub guard_tokens: Option<Vec<Token>>,
    pub if_block: Option<Box<BlockParse>>,
    pub else_block: Option<Box<BlockParse>>,
    pub action: Option<ActionParse>,
    pub assertion_tokens: Option<Vec<Token>>,
    pub stop: bool,
    pub next: Option<Box<BlockParse>>,
}

#[derive(Debug, Clone, Default)]
pub struct StateParse {
    pub name_token: Token,
    pub entry: Option<BlockParse>,
    pub step: Option<BlockParse>,
    pub exit: Option<BlockParse>,
}

#[derive(Debug, Clone, Default)]
pub struct SmParse {
    pub has_sv_section: bool,
    pub sv_elements: Vec<SvElementParse>,
    pub has_local_section: bool,
    pub local_elements: Vec<LocalElementParse>,
    pub states: Vec<StateParse>,
}

fn section_name(tok: &Token) -> &str {
    tok.lexeme.trim_start_matches('[').trim_end_matches(']')
}

/// All declared names across SV elements, local elements, aliases, and
/// states share one namespace — collisions are checked against this set as
/// each name is introduced.
struct Namespace {
    seen: std::collections::HashMap<String, usize>,
}

impl Namespace {
    fn new() -> Self {
        Self { seen: Default::default() }
    }

    fn declare(&mut self, name: &str, line: usize) -> Result<(), SmParseError> {
        if RESERVED_NAMES.contains(&name) {
            return Err(SmParseError::ReservedName(Diagnostic::new(
                "reserved name",
                format!("`{name}` is reserved and may not be redeclared"),
                crate::position::Position::new(line, 1),
            )));
        }
        if let Some(&prior_line) = self.seen.get(name) {
            return Err(SmParseError::NameDuplication(Diagnostic::new(
                "duplicate name",
                format!("`{name}` previously declared on line {prior_line}"),
                crate::position::Position::new(line, 1),
            )));
        }
        self.seen.insert(name.to_string(), line);
        Ok(())
    }

    /// Register a reference to one of the `[state_vector]` section's
    /// cross-referenced elements — these may legitimately be `T`, `G`, or
    /// `S`, so only duplicate-within-section is checked here.
    fn declare_ref(&mut self, name: &str, line: usize) -> Result<(), SmParseError> {
        if let Some(&prior_line) = self.seen.get(name) {
            return Err(SmParseError::NameDuplication(Diagnostic::new(
                "duplicate name",
                format!("`{name}` previously declared on line {prior_line}"),
                crate::position::Position::new(line, 1),
            )));
        }
        self.seen.insert(name.to_string(), line);
        Ok(())
    }
}

pub fn parse(tokens: &[Token]) -> Result<SmParse, SmParseError> {
    let mut cur = TokenCursor::new(tokens);
    let mut sm = SmParse::default();
    let mut ns = Namespace::new();
    cur.eat();

    while !cur.eof() {
        let tok = cur.tok().clone();
        if tok.kind != TokenKind::Section {
            return Err(SmParseError::UnexpectedToken(Diagnostic::new(
                "unexpected token",
                "expected a section header",
                tok.position,
            )));
        }
        let name = section_name(&tok).to_string();
        cur.take();
        let body_start = cur.index();
        let body_end = cur.next(&[TokenKind::Section]);
        let body = cur.slice(body_start, body_end);

        match name.as_str() {
            "state_vector" => {
                if sm.has_sv_section {
                    return Err(SmParseError::MultipleSvSections(Diagnostic::new(
                        "duplicate section",
                        "`[state_vector]` declared more than once",
                        tok.position,
                    )));
                }
                sm.has_sv_section = true;
                parse_sv_section(body, &mut sm, &mut ns)?;
            }
            "local" => {
                if sm.has_local_section {
                    return Err(SmParseError::MultipleLocalSections(Diagnostic::new(
                        "duplicate section",
                        "`[local]` declared more than once",
                        tok.position,
                    )));
                }
                sm.has_local_section = true;
                parse_local_section(body, &mut sm, &mut ns)?;
            }
            _ => {
                // State names get their own reserved-name check at compile
                // time (`ReservedStateName`); only cross-namespace
                // duplication is rejected here.
                ns.declare_ref(&name, tok.position.line)?;
                let state = parse_state_section(&name, tok.clone(), body)?;
                sm.states.push(state);
            }
        }

        cur.seek(body_end);
    }

    Ok(sm)
}

fn parse_sv_section(mut cur: TokenCursor, sm: &mut SmParse, ns: &mut Namespace) -> Result<(), SmParseError> {
    while !cur.eof() {
        let type_token = cur.tok().clone();
        if type_token.kind != TokenKind::Identifier {
            return Err(SmParseError::ExpectedElementType(Diagnostic::new(
                "expected element type",
                format!("expected a state vector element type, got `{}`", type_token.lexeme),
                type_token.position,
            )));
        }
        cur.take();

        let name_token = cur.tok().clone();
        if name_token.kind != TokenKind::Identifier {
            return Err(SmParseError::ExpectedElementName(Diagnostic::new(
                "expected element name",
                format!("expected element name after type `{}`", type_token.lexeme),
                name_token.position,
            )));
        }
        cur.take();
        ns.declare_ref(&name_token.lexeme, name_token.position.line)?;

        let mut read_only = false;
        let mut alias = None;
        let mut seen_read_only = false;
        while cur.kind() == Some(TokenKind::Annotation) {
            let ann = cur.tok().clone();
            if ann.lexeme == "@read_only" {
                if seen_read_only {
                    return Err(SmParseError::RedundantAnnotation(Diagnostic::new(
                        "redundant annotation",
                        "`@read_only` repeated on the same element",
                        ann.position,
                    )));
                }
                seen_read_only = true;
                read_only = true;
                cur.take();
            } else if let Some(name) = ann.lexeme.strip_prefix("@ALIAS=") {
                if name.is_empty() || !name.chars().next().unwrap().is_alphabetic() {
                    return Err(SmParseError::BadAlias(Diagnostic::new(
                        "bad alias",
                        "`@ALIAS=` must be followed by an identifier",
                        ann.position,
                    )));
                }
                if alias.is_some() {
                    return Err(SmParseError::MultipleAliases(Diagnostic::new(
                        "multiple aliases",
                        "an element may have at most one alias",
                        ann.position,
                    )));
                }
                alias = Some(Token::new(TokenKind::Identifier, name, ann.position));
                cur.take();
            } else {
                return Err(SmParseError::UnknownAnnotation(Diagnostic::new(
                    "unknown annotation",
                    format!("`{}` is not recognized here", ann.lexeme),
                    ann.position,
                )));
            }
        }

        if let Some(alias) = &alias {
            ns.declare_ref(&alias.lexeme, alias.position.line)?;
        }

        sm.sv_elements.push(SvElementParse {
            type_token,
            name_token,
            read_only,
            alias,
        });
    }
    Ok(())
}

fn parse_local_section(mut cur: TokenCursor, sm: &mut SmParse, ns: &mut Namespace) -> Result<(), SmParseError> {
    while !cur.eof() {
        let type_token = cur.tok().clone();
        if type_token.kind != TokenKind::Identifier {
            return Err(SmParseError::ExpectedElementType(Diagnostic::new(
                "expected element type",
                format!("expected a local element type, got `{}`", type_token.lexeme),
                type_token.position,
            )));
        }
        cur.take();

        let name_token = cur.tok().clone();
        if name_token.kind != TokenKind::Identifier {
            return Err(SmParseError::ExpectedElementName(Diagnostic::new(
                "expected element name",
                format!("expected local element name after type `{}`", type_token.lexeme),
                name_token.position,
            )));
        }
        cur.take();
        ns.declare(&name_token.lexeme, name_token.position.line)?;

        if cur.kind() != Some(TokenKind::Operator) || cur.lexeme() != "=" {
            return Err(SmParseError::ExpectedAssign(Diagnostic::new(
                "expected `=`",
                format!("expected `=` after local element name `{}`", name_token.lexeme),
                cur.tok().position,
            )));
        }
        cur.take();

        let init_start = cur.index();
        let mut depth = 0i32;
        let mut end = init_start;
        loop {
            if end >= cur.len() {
                break;
            }
            match cur[end].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                TokenKind::Newline if depth == 0 => break,
                TokenKind::Annotation if depth == 0 => break,
                _ => {}
            }
            end += 1;
        }
        if end == init_start {
            return Err(SmParseError::ExpectedInitValue(Diagnostic::new(
                "expected initializer",
                format!("expected an initial value for `{}`", name_token.lexeme),
                cur.tok().position,
            )));
        }
        let init_tokens: Vec<Token> = (init_start..end).map(|i| cur[i].clone()).collect();
        cur.seek(end);

        let mut read_only = false;
        while cur.kind() == Some(TokenKind::Annotation) {
            let ann = cur.tok().clone();
            if ann.lexeme == "@read_only" {
                if read_only {
                    return Err(SmParseError::RedundantAnnotation(Diagnostic::new(
                        "redundant annotation",
                        "`@read_only` repeated on the same element",
                        ann.position,
                    )));
                }
                read_only = true;
                cur.take();
            } else {
                return Err(SmParseError::UnknownAnnotation(Diagnostic::new(
                    "unknown annotation",
                    format!("`{}` is not recognized here", ann.lexeme),
                    ann.position,
                )));
            }
        }

        cur.eat();

        sm.local_elements.push(LocalElementParse {
            type_token,
            name_token,
            init_tokens,
            read_only,
        });
    }
    Ok(())
}

fn parse_state_section(_name: &str, name_token: Token, mut cur: TokenCursor) -> Result<StateParse, SmParseError> {
    let mut state = StateParse {
        name_token,
        ..Default::default()
    };

    while !cur.eof() {
        let label_tok = cur.tok().clone();
        if label_tok.kind != TokenKind::Label {
            return Err(SmParseError::ExpectedLabel(Diagnostic::new(
                "expected a label",
                format!("expected `.entry`, `.step`, or `.exit`, got `{}`", label_tok.lexeme),
                label_tok.position,
            )));
        }
        cur.take();

        let body_start = cur.index();
        let body_end = cur.next(&[TokenKind::Label]);
        let body_tokens: Vec<Token> = (body_start..body_end).map(|i| cur[i].clone()).collect();
        let block = parse_block(&body_tokens)?;

        match label_tok.lexeme.as_str() {
            ".entry" => state.entry = block,
            ".step" => state.step = block,
            ".exit" => state.exit = block,
            other => {
                return Err(SmParseError::ExpectedLabel(Diagnostic::new(
                    "unknown label",
                    format!("`{other}` is not a recognized label"),
                    label_tok.position,
                )))
            }
        }

        cur.seek(body_end);
    }

    Ok(state)
}

/// Parse one label body (or a brace-delimited sub-body) into a `BlockParse`
/// chain. `None` for an empty body.
fn parse_block(tokens: &[Token]) -> Result<Option<BlockParse>, SmParseError> {
    let tokens = strip_leading_newlines(tokens);
    if tokens.is_empty() {
        return Ok(None);
    }

    let term = find_terminator(tokens);
    match term {
        Some((idx, TokenKind::Colon)) | Some((idx, TokenKind::LBrace)) => {
            let is_brace = tokens[idx].kind == TokenKind::LBrace;
            let mut guard_tokens = tokens[..idx].to_vec();
            if guard_tokens.first().map(|t| t.kind) == Some(TokenKind::Keyword) && guard_tokens[0].lexeme == "if" {
                guard_tokens.remove(0);
            }

            let (body, rest) = if is_brace {
                let close = matching_rbrace(tokens, idx)?;
                (&tokens[idx + 1..close], &tokens[close + 1..])
            } else {
                let line_end = tokens[idx + 1..]
                    .iter()
                    .position(|t| t.kind == TokenKind::Newline)
                    .map(|p| idx + 1 + p)
                    .unwrap_or(tokens.len());
                (&tokens[idx + 1..line_end], &tokens[line_end..])
            };

            let if_block = parse_block(body)?.map(Box::new);
            let rest = strip_leading_newlines(rest);

            let (else_block, after_else) = if rest.first().map(|t| t.kind == TokenKind::Keyword && t.lexeme == "else").unwrap_or(false) {
                let else_term = find_terminator(&rest[1..]).map(|(i, k)| (i + 1, k));
                match else_term {
                    Some((eidx, TokenKind::Colon)) => {
                        let line_end = rest[eidx + 1..]
                            .iter()
                            .position(|t| t.kind == TokenKind::Newline)
                            .map(|p| eidx + 1 + p)
                            .unwrap_or(rest.len());
                        let body = &rest[eidx + 1..line_end];
                        if body.is_empty() {
                            return Err(SmParseError::EmptyElse(Diagnostic::new(
                                "empty else",
                                "`else` has no body",
                                rest[0].position,
                            )));
                        }
                        (parse_block(body)?.map(Box::new), &rest[line_end..])
                    }
                    Some((eidx, TokenKind::LBrace)) => {
                        let close = matching_rbrace(rest, eidx)?;
                        let body = &rest[eidx + 1..close];
                        if body.is_empty() {
                            return Err(SmParseError::EmptyElse(Diagnostic::new(
                                "empty else",
                                "`else` has no body",
                                rest[0].position,
                            )));
                        }
                        (parse_block(body)?.map(Box::new), &rest[close + 1..])
                    }
                    _ => {
                        return Err(SmParseError::EmptyElse(Diagnostic::new(
                            "empty else",
                            "`else` must be followed by `:` or `{`",
                            rest[0].position,
                        )))
                    }
                }
            } else {
                (None, rest)
            };

            let next = parse_block(after_else)?.map(Box::new);

            Ok(Some(BlockParse {
                guard_tokens: Some(guard_tokens),
                if_block,
                else_block,
                next,
                ..Default::default()
            }))
        }
        Some((idx, TokenKind::Newline)) => {
            let stmt = &tokens[..idx];
            let rest = &tokens[idx + 1..];
            let block = parse_statement(stmt)?;
            let next = parse_block(rest)?.map(Box::new);
            Ok(Some(BlockParse { next, ..block }))
        }
        _ => {
            // No terminator at all: the whole remainder is one statement.
            parse_statement(tokens).map(Some)
        }
    }
}

fn parse_statement(tokens: &[Token]) -> Result<BlockParse, SmParseError> {
    if tokens.is_empty() {
        return Ok(BlockParse::default());
    }

    if tokens[0].kind == TokenKind::Annotation && tokens[0].lexeme == "@assert" {
        return Ok(BlockParse {
            assertion_tokens: Some(tokens[1..].to_vec()),
            ..Default::default()
        });
    }
    if tokens[0].kind == TokenKind::Annotation && tokens[0].lexeme == "@stop" {
        return Ok(BlockParse {
            stop: true,
            ..Default::default()
        });
    }

    let action = parse_action(tokens)?;
    Ok(BlockParse {
        action: Some(action),
        ..Default::default()
    })
}

fn parse_action(tokens: &[Token]) -> Result<ActionParse, SmParseError> {
    match tokens[0].kind {
        TokenKind::Identifier => {
            if tokens.len() < 2 || tokens[1].kind != TokenKind::Operator || tokens[1].lexeme != "=" {
                return Err(SmParseError::ExpectedAssign(Diagnostic::new(
                    "expected `=`",
                    format!("expected `=` after `{}`", tokens[0].lexeme),
                    tokens[0].position,
                )));
            }
            if tokens.len() < 3 {
                return Err(ExprParseError::EmptyExpression(Diagnostic::new(
                    "empty expression",
                    "expected an expression after `=`",
                    tokens[1].position,
                ))
                .into());
            }
            Ok(ActionParse::Assign {
                lhs: tokens[0].clone(),
                rhs_tokens: tokens[2..].to_vec(),
            })
        }
        TokenKind::Operator if tokens[0].lexeme == "->" => {
            if tokens.len() < 2 || tokens[1].kind != TokenKind::Identifier {
                return Err(SmParseError::ExpectedDestState(Diagnostic::new(
                    "expected destination state",
                    "expected a state name after `->`",
                    tokens[0].position,
                )));
            }
            if tokens.len() > 2 {
                return Err(SmParseError::JunkAfterTransition(Diagnostic::new(
                    "junk after transition",
                    "nothing may follow a transition's destination state",
                    tokens[2].position,
                )));
            }
            Ok(ActionParse::Transition { dest: tokens[1].clone() })
        }
        _ => Err(SmParseError::ExpectedActionOrTransition(Diagnostic::new(
            "expected action or transition",
            format!("expected an assignment or `->`, got `{}`", tokens[0].lexeme),
            tokens[0].position,
        ))),
    }
}

fn strip_leading_newlines(tokens: &[Token]) -> &[Token] {
    let mut i = 0;
    while i < tokens.len() && tokens[i].kind == TokenKind::Newline {
        i += 1;
    }
    &tokens[i..]
}

fn find_terminator(tokens: &[Token]) -> Option<(usize, TokenKind)> {
    tokens
        .iter()
        .position(|t| matches!(t.kind, TokenKind::Colon | TokenKind::LBrace | TokenKind::Newline))
        .map(|i| (i, tokens[i].kind))
}

fn matching_rbrace(tokens: &[Token], open: usize) -> Result<usize, SmParseError> {
    let mut depth = 0i32;
    let mut i = open;
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::LBrace => depth += 1,
            TokenKind::RBrace => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(SmParseError::UnbalancedBrace(Diagnostic::new(
        "unbalanced brace",
        "unmatched `{`",
        tokens[open].position,
    )))
}

/// Parse a guard or initializer's raw tokens as an expression, wrapping the
/// error into this module's error type.
pub fn parse_expr_tokens(tokens: &[Token]) -> Result<crate::expr::ExpressionParse, SmParseError> {
    let tokens: Vec<Token> = tokens.iter().filter(|t| t.kind != TokenKind::Newline).cloned().collect();
    parse_expression(&tokens).map_err(SmParseError::from)
}

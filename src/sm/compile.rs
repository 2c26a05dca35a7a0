//! State-machine compilation: a [`SmParse`] tree plus a bound
//! [`StateVector`] → a runnable [`StateMachine`].
//!
//! The state machine never owns elements directly — every element it touches
//! is either cross-referenced from the caller's state vector (`[state_vector]`
//! section, including the mandatory `T`/`G`/`S` trio established by name or
//! by `@ALIAS=`) or a fresh local element allocated from the `[local]`
//! section's own small state vector.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{Diagnostic, ExprCompileError, SmCompileError};
use crate::expr::{compile as compile_expr, CompiledExpression};
use crate::operator::Arithmeticity;
use crate::position::Position;
use crate::primitive::PrimitiveType;
use crate::runtime::element::ElementAccess;
use crate::runtime::state_vector::StateVector;
use crate::sm::parse::{parse_expr_tokens, ActionParse, BlockParse, LocalElementParse, SmParse, RESERVED_NAMES};
use crate::sm::runtime::{Action, Block, StateConfig, StateMachine};
use crate::sv::parse::{ElementParse as SvElemParse, RegionParse, SvParse};
use crate::token::{Token, TokenKind};

fn section_name(tok: &Token) -> &str {
    tok.lexeme.trim_start_matches('[').trim_end_matches(']')
}

/// Compile a parsed state-machine config against a bound state vector.
/// `init_state` names the state to start in; the first declared state is used
/// when it's `None`.
pub fn compile(parse: &SmParse, sv: &StateVector, init_state: Option<&str>) -> Result<StateMachine, SmCompileError> {
    let (mut elems, mut read_only) = bind_sv_elements(parse, sv)?;
    compile_local_elements(parse, &mut elems, &mut read_only)?;

    let elem_global_time = elems.get("T").cloned().ok_or_else(|| {
        SmCompileError::NoGlobalTime(Diagnostic::new(
            "no global time",
            "no state vector element is named or aliased `T`",
            Position::new(0, 0),
        ))
    })?;
    let elem_state_time = elems.get("G").cloned().ok_or_else(|| {
        SmCompileError::NoStateTime(Diagnostic::new(
            "no state time",
            "no state vector element is named or aliased `G`",
            Position::new(0, 0),
        ))
    })?;
    let elem_state = elems.get("S").cloned().ok_or_else(|| {
        SmCompileError::NoStateId(Diagnostic::new(
            "no state id",
            "no state vector element is named or aliased `S`",
            Position::new(0, 0),
        ))
    })?;

    if parse.states.is_empty() {
        return Err(SmCompileError::InitStateUnknown(Diagnostic::new(
            "no states",
            "a state machine must declare at least one state",
            Position::new(0, 0),
        )));
    }

    let mut state_ids: HashMap<String, u32> = HashMap::new();
    for (i, st) in parse.states.iter().enumerate() {
        let name = section_name(&st.name_token);
        if RESERVED_NAMES.contains(&name) {
            return Err(SmCompileError::ReservedStateName(Diagnostic::new(
                "reserved state name",
                format!("`{name}` is reserved and may not name a state"),
                st.name_token.position,
            )));
        }
        state_ids.insert(name.to_string(), (i + 1) as u32);
    }

    let init_name = init_state.map(str::to_string).unwrap_or_else(|| section_name(&parse.states[0].name_token).to_string());
    let init_id = *state_ids.get(&init_name).ok_or_else(|| {
        SmCompileError::InitStateUnknown(Diagnostic::new(
            "unknown initial state",
            format!("no state named `{init_name}`"),
            Position::new(0, 0),
        ))
    })?;

    let mut exprs: Vec<Rc<CompiledExpression>> = Vec::new();
    let mut states = Vec::new();
    for st in &parse.states {
        let name = section_name(&st.name_token).to_string();
        let id = state_ids[&name];
        let entry = compile_label(st.entry.as_ref(), &elems, &read_only, false, &state_ids, &mut exprs)?;
        let step = compile_label(st.step.as_ref(), &elems, &read_only, false, &state_ids, &mut exprs)?;
        let exit = compile_label(st.exit.as_ref(), &elems, &read_only, true, &state_ids, &mut exprs)?;
        states.push(StateConfig { id, name, entry, step, exit });
    }

    log::debug!("compiled state machine: {} state(s), {} expression(s), initial state `{init_name}`", states.len(), exprs.len());

    Ok(StateMachine::new(states, elem_state, elem_state_time, elem_global_time, exprs, init_id)
        .expect("states is non-empty and init_id was resolved from state_ids above"))
}

/// Cross-reference every `[state_vector]` row against the bound state
/// vector, checking type agreement and collecting `@read_only`/`@ALIAS=`.
/// Both the declared name and (if present) the alias resolve to the same
/// handle, matching the state-vector dialect's own alias behavior.
fn bind_sv_elements(parse: &SmParse, sv: &StateVector) -> Result<(HashMap<String, Rc<dyn ElementAccess>>, HashSet<String>), SmCompileError> {
    let mut elems: HashMap<String, Rc<dyn ElementAccess>> = HashMap::new();
    let mut read_only: HashSet<String> = HashSet::new();

    for e in &parse.sv_elements {
        let handle = sv
            .element(&e.name_token.lexeme)
            .map_err(|_| {
                SmCompileError::SvElementUnknown(Diagnostic::new(
                    "unknown state vector element",
                    format!("`{}` is not an element of the bound state vector", e.name_token.lexeme),
                    e.name_token.position,
                ))
            })?
            .clone();

        let declared_ty = PrimitiveType::from_name(&e.type_token.lexeme).ok_or_else(|| {
            SmCompileError::TypeMismatchInSv(Diagnostic::new(
                "type mismatch",
                format!("`{}` is not a known element type", e.type_token.lexeme),
                e.type_token.position,
            ))
        })?;
        if handle.primitive_type() != declared_ty {
            return Err(SmCompileError::TypeMismatchInSv(Diagnostic::new(
                "type mismatch",
                format!(
                    "`{}` is declared `{}` here but `{}` in the state vector",
                    e.name_token.lexeme,
                    declared_ty.name(),
                    handle.primitive_type().name()
                ),
                e.type_token.position,
            )));
        }

        elems.insert(e.name_token.lexeme.clone(), handle.clone());
        if e.read_only {
            read_only.insert(e.name_token.lexeme.clone());
        }
        if let Some(alias) = &e.alias {
            elems.insert(alias.lexeme.clone(), handle.clone());
            if e.read_only {
                read_only.insert(alias.lexeme.clone());
            }
        }
    }

    Ok((elems, read_only))
}

/// Allocate the `[local]` section's own elements, initialize each in
/// declaration order, and merge them into `elems`/`read_only`. An init
/// expression may reference constants and already-initialized local elements
/// but never a cross-referenced state vector element (`LocalSvCrossRef`) or a
/// local element not yet initialized (`UseBeforeInit`).
fn compile_local_elements(
    parse: &SmParse,
    elems: &mut HashMap<String, Rc<dyn ElementAccess>>,
    read_only: &mut HashSet<String>,
) -> Result<(), SmCompileError> {
    if parse.local_elements.is_empty() {
        return Ok(());
    }

    let sv_bound_names: HashSet<String> = elems.keys().cloned().collect();
    let local_names: HashSet<&str> = parse.local_elements.iter().map(|e| e.name_token.lexeme.as_str()).collect();

    let local_region = RegionParse {
        name_token: Token::synthetic(TokenKind::Section, "[local]"),
        plain_name: "local".to_string(),
        elements: parse
            .local_elements
            .iter()
            .map(|le| SvElemParse {
                type_token: le.type_token.clone(),
                name_token: le.name_token.clone(),
                read_only: false,
                alias: None,
            })
            .collect(),
    };
    let local_sv = crate::sv::compile::compile(&SvParse {
        lock: false,
        regions: vec![local_region],
    })?;

    for le in &parse.local_elements {
        check_local_init_refs(le, &sv_bound_names, &local_names, elems)?;

        let handle = local_sv.element(&le.name_token.lexeme).expect("allocated above").clone();
        let resolve = |name: &str| elems.get(name).cloned();
        let init_parse = parse_expr_tokens(&le.init_tokens)?;
        let init_expected = if handle.primitive_type() == PrimitiveType::Bool {
            Arithmeticity::Logical
        } else {
            Arithmeticity::Arithmetic
        };
        let init_compiled = compile_expr(&init_parse, &resolve, init_expected)?;
        handle.write_f64(init_compiled.evaluate());

        elems.insert(le.name_token.lexeme.clone(), handle);
        if le.read_only {
            read_only.insert(le.name_token.lexeme.clone());
        }
    }

    Ok(())
}

fn check_local_init_refs(
    le: &LocalElementParse,
    sv_bound_names: &HashSet<String>,
    local_names: &HashSet<&str>,
    elems_so_far: &HashMap<String, Rc<dyn ElementAccess>>,
) -> Result<(), SmCompileError> {
    for tok in &le.init_tokens {
        if tok.kind != TokenKind::Identifier {
            continue;
        }
        if sv_bound_names.contains(&tok.lexeme) {
            return Err(SmCompileError::LocalSvCrossRef(Diagnostic::new(
                "local cross-references a state vector element",
                format!("`{}` is bound from `[state_vector]` and may not be used in a local initializer", tok.lexeme),
                tok.position,
            )));
        }
        if local_names.contains(tok.lexeme.as_str()) && !elems_so_far.contains_key(&tok.lexeme) {
            return Err(SmCompileError::UseBeforeInit(Diagnostic::new(
                "use before init",
                format!("`{}` is used before it is initialized", tok.lexeme),
                tok.position,
            )));
        }
    }
    Ok(())
}

/// Compile one `.entry`/`.step`/`.exit` label's block chain, or `None` for an
/// absent label.
fn compile_label(
    block: Option<&BlockParse>,
    elems: &HashMap<String, Rc<dyn ElementAccess>>,
    read_only: &HashSet<String>,
    in_exit: bool,
    state_ids: &HashMap<String, u32>,
    exprs: &mut Vec<Rc<CompiledExpression>>,
) -> Result<Option<Block>, SmCompileError> {
    match block {
        Some(b) => Ok(Some(compile_block(b, elems, read_only, in_exit, state_ids, exprs)?)),
        None => Ok(None),
    }
}

fn compile_block(
    bp: &BlockParse,
    elems: &HashMap<String, Rc<dyn ElementAccess>>,
    read_only: &HashSet<String>,
    in_exit: bool,
    state_ids: &HashMap<String, u32>,
    exprs: &mut Vec<Rc<CompiledExpression>>,
) -> Result<Block, SmCompileError> {
    let resolve = |name: &str| elems.get(name).cloned();

    let guard = match &bp.guard_tokens {
        Some(toks) => {
            let parsed = parse_expr_tokens(toks)?;
            // Guards are predicates: `x > 0`, `a and b`, `not done` — every
            // relational/logical operator roots a `Logical` expression, so a
            // guard is compiled against that arithmeticity and rejected
            // otherwise (e.g. a bare arithmetic expression with no comparison).
            let compiled = Rc::new(compile_expr(&parsed, &resolve, Arithmeticity::Logical)?);
            exprs.push(compiled.clone());
            Some(compiled)
        }
        None => None,
    };

    let if_block = match &bp.if_block {
        Some(b) => Some(Box::new(compile_block(b, elems, read_only, in_exit, state_ids, exprs)?)),
        None => None,
    };
    let else_block = match &bp.else_block {
        Some(b) => Some(Box::new(compile_block(b, elems, read_only, in_exit, state_ids, exprs)?)),
        None => None,
    };

    if bp.assertion_tokens.is_some() {
        let pos = bp.assertion_tokens.as_ref().and_then(|t| t.first()).map(|t| t.position).unwrap_or_else(|| Position::new(0, 0));
        return Err(SmCompileError::IllegalAssertion(Diagnostic::new(
            "illegal assertion",
            "`@assert` may not appear in a state machine block",
            pos,
        )));
    }
    if bp.stop {
        return Err(SmCompileError::IllegalStop(Diagnostic::new(
            "illegal stop",
            "`@stop` may not appear in a state machine block",
            Position::new(0, 0),
        )));
    }

    let action = match &bp.action {
        Some(ActionParse::Assign { lhs, rhs_tokens }) => {
            let handle = elems.get(&lhs.lexeme).cloned().ok_or_else(|| {
                ExprCompileError::UnknownElement(Diagnostic::new(
                    "unknown element",
                    format!("`{}` is not a state vector element", lhs.lexeme),
                    lhs.position,
                ))
            })?;
            if read_only.contains(&lhs.lexeme) {
                return Err(SmCompileError::AssignmentToReadOnly(Diagnostic::new(
                    "assignment to read-only element",
                    format!("`{}` is declared `@read_only`", lhs.lexeme),
                    lhs.position,
                )));
            }

            let parsed = parse_expr_tokens(rhs_tokens)?;
            let expected = if handle.primitive_type() == PrimitiveType::Bool {
                Arithmeticity::Logical
            } else {
                Arithmeticity::Arithmetic
            };
            let compiled = compile_expr(&parsed, &resolve, expected)?;
            let compiled = Rc::new(compiled);
            exprs.push(compiled.clone());
            Some(Action::Assign { element: handle, expr: compiled })
        }
        Some(ActionParse::Transition { dest }) => {
            if in_exit {
                return Err(SmCompileError::TransitionInExit(Diagnostic::new(
                    "transition in exit",
                    "a transition may not appear in `.exit`",
                    dest.position,
                )));
            }
            let id = *state_ids.get(&dest.lexeme).ok_or_else(|| {
                SmCompileError::TransitionUnknown(Diagnostic::new(
                    "unknown transition destination",
                    format!("no state named `{}`", dest.lexeme),
                    dest.position,
                ))
            })?;
            Some(Action::Transition { dest_state: id })
        }
        None => None,
    };

    let next = match &bp.next {
        Some(b) => Some(Box::new(compile_block(b, elems, read_only, in_exit, state_ids, exprs)?)),
        None => None,
    };

    Ok(Block {
        guard,
        if_block,
        else_block,
        action,
        next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sm::parse::parse as parse_sm;
    use crate::sv::compile::compile as compile_sv;
    use crate::sv::parse::parse as parse_sv;
    use crate::tokenizer::tokenize;

    fn compile_str(sv_src: &str, sm_src: &str, init: Option<&str>) -> StateMachine {
        let sv_toks = tokenize(sv_src).unwrap();
        let sv_parsed = parse_sv(&sv_toks, &[]).unwrap();
        let sv = compile_sv(&sv_parsed).unwrap();

        let sm_toks = tokenize(sm_src).unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        compile(&sm_parsed, &sv, init).unwrap()
    }

    #[test]
    fn alias_resolves_t_g_s_and_runs_a_step() {
        let sv_src = "[Clock]\nU64 clock_time\nU32 cur_state\nU64 elapsed @alias G\n";
        let sm_src = "[state_vector]\nU64 clock_time @ALIAS=T\nU32 cur_state @ALIAS=S\nU64 elapsed\n[Init]\n.step\n-> Run\n[Run]\n";
        let sm = compile_str(sv_src, sm_src, None);
        assert_eq!(sm.current_state_name(), "Init");
    }

    #[test]
    fn local_element_initializes_and_steps() {
        let sv_src = "[Clock]\nU64 t\nU32 s\nU64 g\n";
        let sm_src = "[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\n[local]\nI32 counter = 0\n[Init]\n.step\ncounter = counter + 1\n";
        let sm = compile_str(sv_src, sm_src, None);
        assert_eq!(sm.current_state_name(), "Init");
    }

    #[test]
    fn missing_global_time_is_rejected() {
        let sv_toks = tokenize("[A]\nU32 s\nU64 g\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks = tokenize("[state_vector]\nU32 s @ALIAS=S\nU64 g @ALIAS=G\n[Init]\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::NoGlobalTime(_)));
    }

    #[test]
    fn reserved_state_name_is_rejected_at_compile_time() {
        let sv_toks = tokenize("[A]\nU64 t\nU32 s\nU64 g\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks = tokenize("[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\n[T]\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::ReservedStateName(_)));
    }

    #[test]
    fn transition_to_unknown_state_is_rejected() {
        let sv_toks = tokenize("[A]\nU64 t\nU32 s\nU64 g\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks = tokenize("[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\n[Init]\n.step\n-> Nowhere\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::TransitionUnknown(_)));
    }

    #[test]
    fn transition_in_exit_is_rejected() {
        let sv_toks = tokenize("[A]\nU64 t\nU32 s\nU64 g\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks = tokenize("[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\n[Init]\n.exit\n-> Init\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::TransitionInExit(_)));
    }

    #[test]
    fn assignment_to_read_only_is_rejected() {
        let sv_toks = tokenize("[A]\nU64 t\nU32 s\nU64 g\nI32 locked @read_only\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks =
            tokenize("[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\nI32 locked @read_only\n[Init]\n.step\nlocked = 1\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::AssignmentToReadOnly(_)));
    }

    #[test]
    fn local_element_referencing_sv_element_is_rejected() {
        let sv_toks = tokenize("[A]\nU64 t\nU32 s\nU64 g\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks = tokenize("[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\n[local]\nU64 copy = t\n[Init]\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::LocalSvCrossRef(_)));
    }

    #[test]
    fn local_element_use_before_init_is_rejected() {
        let sv_toks = tokenize("[A]\nU64 t\nU32 s\nU64 g\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks = tokenize("[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\n[local]\nI32 a = b\nI32 b = 1\n[Init]\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::UseBeforeInit(_)));
    }

    #[test]
    fn assert_annotation_is_illegal_in_state_machine_blocks() {
        let sv_toks = tokenize("[A]\nU64 t\nU32 s\nU64 g\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks = tokenize("[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\n[Init]\n.step\n@assert t > 0\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::IllegalAssertion(_)));
    }

    #[test]
    fn entry_runs_once_then_step_runs_every_tick() {
        let sv_src = "[state_vector]\nU64 T\nU64 G\nU32 S\nI32 x\n";
        let sv_toks = tokenize(sv_src).unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();

        let sm_src = "[state_vector]\nU64 T\nU64 G\nU32 S\nI32 x\n[S1]\n.entry\nx = 1\n.step\nx = x + 1\n";
        let sm_toks = tokenize(sm_src).unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let machine = compile(&sm_parsed, &sv, None).unwrap();

        let t = sv.element("T").unwrap();
        let g = sv.element("G").unwrap();
        let x = sv.element("x").unwrap();

        t.write_f64(10.0);
        machine.step().unwrap();
        assert_eq!(x.read_f64(), 1.0);
        assert_eq!(g.read_f64(), 0.0);

        t.write_f64(20.0);
        machine.step().unwrap();
        assert_eq!(x.read_f64(), 2.0);
        assert_eq!(g.read_f64(), 10.0);

        t.write_f64(30.0);
        machine.step().unwrap();
        assert_eq!(x.read_f64(), 3.0);
        assert_eq!(g.read_f64(), 20.0);
    }

    #[test]
    fn guard_compiles_as_a_logical_expression_and_gates_the_action() {
        let sv_src = "[A]\nU64 t\nU32 s\nU64 g\nI32 x\n";
        let sm_src = "[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\nI32 x\n[Init]\n.step\nx > 0 : x = 1\n";
        let sm = compile_str(sv_src, sm_src, None);
        assert_eq!(sm.current_state_name(), "Init");
    }

    #[test]
    fn guard_rejects_a_bare_arithmetic_expression() {
        let sv_toks = tokenize("[A]\nU64 t\nU32 s\nU64 g\nI32 x\n").unwrap();
        let sv = compile_sv(&parse_sv(&sv_toks, &[]).unwrap()).unwrap();
        let sm_toks = tokenize("[state_vector]\nU64 t @ALIAS=T\nU32 s @ALIAS=S\nU64 g @ALIAS=G\nI32 x\n[Init]\n.step\nx + 1 : x = 1\n").unwrap();
        let sm_parsed = parse_sm(&sm_toks).unwrap();
        let err = compile(&sm_parsed, &sv, None).unwrap_err();
        assert!(matches!(err, SmCompileError::Expr(ExprCompileError::TypeMismatch(_))));
    }
}

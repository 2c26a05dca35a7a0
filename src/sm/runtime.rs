//! The state-machine runtime: compiled blocks, actions, and the stepping
//! loop that drives a [`StateMachine`] forward one time step at a time.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::expr::CompiledExpression;
use crate::runtime::element::ElementAccess;

/// Sentinel destination meaning "no transition occurred."
pub const NO_STATE: u32 = 0;

#[derive(Debug)]
pub enum Action {
    Assign {
        element: Rc<dyn ElementAccess>,
        expr: Rc<CompiledExpression>,
    },
    Transition {
        dest_state: u32,
    },
}

impl Action {
    fn execute(&self) -> u32 {
        match self {
            Action::Assign { element, expr } => {
                element.write_f64(expr.evaluate());
                NO_STATE
            }
            Action::Transition { dest_state } => *dest_state,
        }
    }
}

/// One node of a label's block chain: an optional guarded if/else, an
/// optional inline action, and the next block in sequence. A block carries
/// either a guard (with `if_block`/`else_block`) or a bare `action`, never
/// both — the parser never produces the other shape.
#[derive(Debug, Default)]
pub struct Block {
    pub guard: Option<Rc<CompiledExpression>>,
    pub if_block: Option<Box<Block>>,
    pub else_block: Option<Box<Block>>,
    pub action: Option<Action>,
    pub next: Option<Box<Block>>,
}

impl Block {
    /// Runs this block and everything chained after it, stopping as soon as
    /// something transitions. Returns the destination state id, or
    /// `NO_STATE` if nothing in the chain transitioned.
    pub fn execute(&self) -> u32 {
        if let Some(guard) = &self.guard {
            if guard.evaluate() != 0.0 {
                if let Some(b) = &self.if_block {
                    let ret = b.execute();
                    if ret != NO_STATE {
                        return ret;
                    }
                }
            } else if let Some(b) = &self.else_block {
                let ret = b.execute();
                if ret != NO_STATE {
                    return ret;
                }
            }
        }

        if let Some(action) = &self.action {
            let dest = action.execute();
            if dest != NO_STATE {
                return dest;
            }
        }

        if let Some(next) = &self.next {
            return next.execute();
        }

        NO_STATE
    }
}

#[derive(Debug, Default)]
pub struct StateConfig {
    pub id: u32,
    pub name: String,
    pub entry: Option<Block>,
    pub step: Option<Block>,
    pub exit: Option<Block>,
}

/// A runnable state machine: a fixed set of states, the three reserved
/// elements bound to its state vector (`S` current state, `G` elapsed time
/// in current state, `T` global time), and the flat list of every compiled
/// expression in the machine (guards and assignment right-hand sides) whose
/// rolling-window statistics must advance once per step regardless of
/// whether the expression is actually evaluated that step.
pub struct StateMachine {
    states: Vec<StateConfig>,
    elem_state: Rc<dyn ElementAccess>,
    elem_state_time: Rc<dyn ElementAccess>,
    elem_global_time: Rc<dyn ElementAccess>,
    exprs: Vec<Rc<CompiledExpression>>,
    state_cur: Cell<usize>,
    time_state_start: Cell<Option<u64>>,
    time_last_step: Cell<Option<u64>>,
}

impl StateMachine {
    pub fn new(
        states: Vec<StateConfig>,
        elem_state: Rc<dyn ElementAccess>,
        elem_state_time: Rc<dyn ElementAccess>,
        elem_global_time: Rc<dyn ElementAccess>,
        exprs: Vec<Rc<CompiledExpression>>,
        init_state_id: u32,
    ) -> Result<Self, RuntimeError> {
        if states.is_empty() {
            return Err(RuntimeError::Empty);
        }
        let idx = states
            .iter()
            .position(|s| s.id == init_state_id)
            .ok_or(RuntimeError::State)?;

        Ok(Self {
            states,
            elem_state,
            elem_state_time,
            elem_global_time,
            exprs,
            state_cur: Cell::new(idx),
            time_state_start: Cell::new(None),
            time_last_step: Cell::new(None),
        })
    }

    pub fn current_state_id(&self) -> u32 {
        self.states[self.state_cur.get()].id
    }

    pub fn current_state_name(&self) -> &str {
        &self.states[self.state_cur.get()].name
    }

    /// Elapsed time in the current state as of the last completed `step()`.
    pub fn state_elapsed_time(&self) -> u64 {
        match self.time_state_start.get() {
            None => 0,
            Some(start) => {
                let t_cur = self.elem_global_time.read_f64() as u64;
                t_cur.saturating_sub(start)
            }
        }
    }

    /// Advances the state machine by one step: checks time monotonicity,
    /// updates `S`/`G`, advances every rolling statistic unconditionally,
    /// runs entry (on the first step in a state) then step, and performs the
    /// exit/transition dance if either label transitioned.
    pub fn step(&self) -> Result<(), RuntimeError> {
        let t_cur = self.elem_global_time.read_f64() as u64;
        if let Some(last) = self.time_last_step.get() {
            if t_cur <= last {
                return Err(RuntimeError::Time);
            }
        }

        if self.time_state_start.get().is_none() {
            self.elem_state.write_f64(self.current_state_id() as f64);
            self.time_state_start.set(Some(t_cur));
        }
        let t_state_elapsed = t_cur - self.time_state_start.get().unwrap();
        self.elem_state_time.write_f64(t_state_elapsed as f64);

        for expr in &self.exprs {
            expr.update_rolling_stats();
        }

        let state = &self.states[self.state_cur.get()];
        let mut dest = NO_STATE;
        if t_state_elapsed == 0 {
            if let Some(entry) = &state.entry {
                dest = entry.execute();
            }
        }
        if dest == NO_STATE {
            if let Some(step) = &state.step {
                dest = step.execute();
            }
        }

        if dest != NO_STATE {
            if let Some(exit) = &state.exit {
                exit.execute();
            }
            self.set_state(dest)?;
        }

        self.time_last_step.set(Some(t_cur));
        Ok(())
    }

    fn set_state(&self, dest: u32) -> Result<(), RuntimeError> {
        let idx = self.states.iter().position(|s| s.id == dest).ok_or(RuntimeError::Trans)?;
        log::trace!("state machine transition: `{}` -> `{}`", self.current_state_name(), self.states[idx].name);
        self.state_cur.set(idx);
        self.time_state_start.set(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{compile as compile_expr, parse_expression};
    use crate::operator::Arithmeticity;
    use crate::primitive::PrimitiveType;
    use crate::runtime::element::Element;
    use crate::tokenizer::tokenize;
    use std::cell::RefCell;

    fn make_u32(name: &str, buf: Rc<RefCell<Vec<u8>>>, offset: usize) -> Rc<dyn ElementAccess> {
        Rc::new(Element::<u32>::new(name, offset, PrimitiveType::U32, buf, None))
    }

    fn make_u64(name: &str, buf: Rc<RefCell<Vec<u8>>>, offset: usize) -> Rc<dyn ElementAccess> {
        Rc::new(Element::<u64>::new(name, offset, PrimitiveType::U64, buf, None))
    }

    fn compiled_from(src: &str, expected: Arithmeticity, resolve: impl Fn(&str) -> Option<Rc<dyn ElementAccess>>) -> Rc<CompiledExpression> {
        let toks = tokenize(src).unwrap();
        let parsed = parse_expression(&toks).unwrap();
        Rc::new(compile_expr(&parsed, &resolve, expected).unwrap())
    }

    #[test]
    fn block_chain_propagates_transition_from_nested_if() {
        let buf = Rc::new(RefCell::new(vec![0u8; 4]));
        let x = make_u32("x", buf.clone(), 0);
        let guard = compiled_from("x > 0", Arithmeticity::Logical, |n| if n == "x" { Some(x.clone()) } else { None });
        x.write_f64(5.0);

        let inner = Block {
            action: Some(Action::Transition { dest_state: 7 }),
            ..Default::default()
        };
        let outer = Block {
            guard: Some(guard),
            if_block: Some(Box::new(inner)),
            ..Default::default()
        };

        assert_eq!(outer.execute(), 7);
    }

    #[test]
    fn block_chain_falls_through_to_next_when_guard_is_false() {
        let buf = Rc::new(RefCell::new(vec![0u8; 4]));
        let x = make_u32("x", buf.clone(), 0);
        let guard = compiled_from("x > 0", Arithmeticity::Logical, |n| if n == "x" { Some(x.clone()) } else { None });
        x.write_f64(0.0);

        let guarded = Block {
            guard: Some(guard),
            if_block: Some(Box::new(Block {
                action: Some(Action::Transition { dest_state: 9 }),
                ..Default::default()
            })),
            next: Some(Box::new(Block {
                action: Some(Action::Transition { dest_state: 2 }),
                ..Default::default()
            })),
            ..Default::default()
        };

        assert_eq!(guarded.execute(), 2);
    }

    #[test]
    fn step_runs_entry_only_on_first_step_in_a_state() {
        let buf = Rc::new(RefCell::new(vec![0u8; 20]));
        let s = make_u32("S", buf.clone(), 0);
        let g = make_u64("G", buf.clone(), 4);
        let t = make_u64("T", buf.clone(), 12);

        let counter_buf = Rc::new(RefCell::new(vec![0u8; 4]));
        let counter = make_u32("counter", counter_buf, 0);
        let counter_for_resolve = counter.clone();

        let entry_action = Action::Assign {
            element: counter.clone(),
            expr: compiled_from("1", Arithmeticity::Arithmetic, move |n| if n == "counter" { Some(counter_for_resolve.clone()) } else { None }),
        };
        let entry_block = Block {
            action: Some(entry_action),
            ..Default::default()
        };

        let state = StateConfig {
            id: 1,
            name: "Init".into(),
            entry: Some(entry_block),
            step: None,
            exit: None,
        };

        let sm = StateMachine::new(vec![state], s, g, t.clone(), vec![], 1).unwrap();

        t.write_f64(1.0);
        sm.step().unwrap();
        assert_eq!(counter.read_f64(), 1.0);

        counter.write_f64(0.0);
        t.write_f64(2.0);
        sm.step().unwrap();
        assert_eq!(counter.read_f64(), 0.0, "entry must not re-run after the first step in a state");
    }

    #[test]
    fn step_rejects_non_monotonic_time() {
        let buf = Rc::new(RefCell::new(vec![0u8; 20]));
        let s = make_u32("S", buf.clone(), 0);
        let g = make_u64("G", buf.clone(), 4);
        let t = make_u64("T", buf.clone(), 12);
        let state = StateConfig {
            id: 1,
            name: "Init".into(),
            entry: None,
            step: None,
            exit: None,
        };
        let sm = StateMachine::new(vec![state], s, g, t.clone(), vec![], 1).unwrap();

        t.write_f64(5.0);
        sm.step().unwrap();
        t.write_f64(5.0);
        assert_eq!(sm.step(), Err(RuntimeError::Time));
    }

    #[test]
    fn step_transitions_and_resets_state_time() {
        let buf = Rc::new(RefCell::new(vec![0u8; 20]));
        let s = make_u32("S", buf.clone(), 0);
        let g = make_u64("G", buf.clone(), 4);
        let t = make_u64("T", buf.clone(), 12);

        let init = StateConfig {
            id: 1,
            name: "Init".into(),
            entry: None,
            step: Some(Block {
                action: Some(Action::Transition { dest_state: 2 }),
                ..Default::default()
            }),
            exit: None,
        };
        let run = StateConfig {
            id: 2,
            name: "Run".into(),
            entry: None,
            step: None,
            exit: None,
        };
        let sm = StateMachine::new(vec![init, run], s.clone(), g, t.clone(), vec![], 1).unwrap();

        t.write_f64(1.0);
        sm.step().unwrap();
        assert_eq!(sm.current_state_id(), 2);
        assert_eq!(s.read_f64(), 1.0);
    }
}

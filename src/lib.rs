//! Surefire is a small configuration language and runtime for state-vector
//! driven state machines: a state vector declares a flat, typed,
//! region-organized block of memory; a state machine cross-references it (or
//! allocates its own local elements) and steps through guarded
//! entry/step/exit blocks that read and write that memory.
//!
//! # Overview
//!
//! The toolchain has three independent dialects sharing one expression
//! language and one tokenizer:
//!
//! - [`sv`] parses and compiles `[region]` sections into a runtime
//!   [`runtime::StateVector`] — a byte buffer plus named, typed element
//!   handles.
//! - [`expr`] parses and compiles the arithmetic/logical expression grammar
//!   shared by state-vector initializers and state-machine guards/actions,
//!   including windowed rolling statistics (`roll_avg(x, 50)` and friends).
//! - [`sm`] parses and compiles a state-machine configuration against a
//!   bound state vector, producing a [`sm::StateMachine`] that steps forward
//!   one time tick at a time.
//!
//! [`tokenizer::tokenize`] turns source text into a flat [`token::Token`]
//! stream; [`cursor::TokenCursor`] is how every parser walks that stream.
//! [`error::SurefireError`] unifies every phase's error type for callers who
//! want to drive tokenize → parse → compile without matching each phase by
//! hand.
//!
//! # Example
//!
//! ```
//! use surefire::tokenizer::tokenize;
//! use surefire::sv;
//! use surefire::sm;
//!
//! let sv_src = "[counters]\nU32 ticks\nU64 clock\nU64 elapsed\nU32 state\n";
//! let sv_tokens = tokenize(sv_src).unwrap();
//! let sv_parse = sv::parse(&sv_tokens, &[]).unwrap();
//! let state_vector = sv::compile(&sv_parse).unwrap();
//!
//! let sm_src = "[state_vector]\nU32 ticks\nU64 clock @ALIAS=T\nU64 elapsed @ALIAS=G\nU32 state @ALIAS=S\n[Init]\n.step\nticks = ticks + 1\n";
//! let sm_tokens = tokenize(sm_src).unwrap();
//! let sm_parse = sm::parse_state_machine(&sm_tokens).unwrap();
//! let machine = sm::compile_state_machine(&sm_parse, &state_vector, None).unwrap();
//! assert_eq!(machine.current_state_name(), "Init");
//! ```
//!
//! # License
//! This crate is provided under the MIT OR Apache-2.0 license.

pub mod cast;
pub mod cursor;
pub mod error;
pub mod expr;
pub mod operator;
pub mod position;
pub mod primitive;
pub mod runtime;
pub mod sm;
pub mod sv;
pub mod token;
pub mod tokenizer;

pub use error::SurefireError;
pub use tokenizer::tokenize;

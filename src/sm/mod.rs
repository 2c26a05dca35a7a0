//! State-machine configuration: parsing, compilation, and the runtime
//! stepping loop.

pub mod compile;
pub mod parse;
pub mod runtime;

pub use compile::compile as compile_state_machine;
pub use parse::{parse as parse_state_machine, ActionParse, BlockParse, LocalElementParse, SmParse, StateParse, SvElementParse};
pub use runtime::{Action, Block, StateConfig, StateMachine, NO_STATE};

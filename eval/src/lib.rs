//! `lazuli-eval` implements the bytecode interpreter and execution
//! engine of the lazuli scripting language.
//!
//! The language's defining feature is first-class, lazy, cross-module
//! variable bindings addressed by hierarchical dotted names ("dollar
//! names"). Compiled code units run on a stack machine; whenever an
//! expression depends on a dollar value that is not known yet, the
//! current frame suspends into a continuation thunk and control
//! returns to the [`ExecutionEngine`], which schedules pending work,
//! discovers ordering constraints between dollar names by
//! observation, and rolls back and retries when it finds it committed
//! a value too early.
//!
//! The compiler producing the bytecode is a separate program; this
//! crate consumes its output (see the [`wire`] module for the file
//! format) and exposes the engine, the value model and the observer
//! hooks needed to drive and trace execution.

mod builtins;
mod chunk;
mod engine;
mod errors;
pub mod observer;
mod opcode;
mod value;
mod vm;
pub mod wire;

#[cfg(test)]
mod properties;
#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

pub use chunk::Code;
pub use engine::{
    DollarName, ExecutionEngine, GET_PARTIAL, SET_DEFAULT, SET_MODIFICATION,
};
pub use errors::{Error, ErrorKind, EvalResult};
pub use opcode::{pack_halves, split_halves, Op, INSTRUCTION_WIDTH, NO_STAR, SKIP_SENTINEL};
pub use value::{
    BoundMethod, Builtin, Dict, EnvMap, Function, ListIter, Module, Property, Signature,
    SubIter, Thunk, ThunkKind, Type, Types, Value,
};
pub use vm::Frame;

//! Host-implemented callables and the method-binding wrappers.

use std::fmt::{self, Display};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::engine::ExecutionEngine;
use crate::errors::{ErrorKind, EvalResult};

use super::Value;

type BuiltinFn = dyn Fn(&ExecutionEngine, &[Value]) -> EvalResult<Value>;

/// A function implemented in the host. Builtins receive the engine so
/// that operator tables can re-dispatch and the engine bindings can
/// record thunks.
pub struct Builtin {
    name: SmolStr,
    func: Box<BuiltinFn>,
}

impl Builtin {
    /// Construct a builtin, immediately wrapped as a [`Value`].
    pub fn new(
        name: &str,
        func: impl Fn(&ExecutionEngine, &[Value]) -> EvalResult<Value> + 'static,
    ) -> Value {
        Value::Builtin(Rc::new(Builtin {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, engine: &ExecutionEngine, args: &[Value]) -> EvalResult<Value> {
        (self.func)(engine, args)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinFunction({})", self.name)
    }
}

/// A callable bound to the receiver it was looked up on.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub func: Value,
}

impl Display for BoundMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundMethod({}, {})", self.receiver, self.func)
    }
}

/// An attribute that is computed on access instead of stored.
#[derive(Debug)]
pub struct Property {
    pub func: Value,
}

impl Property {
    pub fn new(func: Value) -> Value {
        Value::Property(Rc::new(Property { func }))
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({})", self.func)
    }
}

/// Check a builtin's argument count, viewing the arguments as a
/// fixed-size array.
pub(crate) fn check_arity<const N: usize>(args: &[Value]) -> EvalResult<&[Value; N]> {
    args.try_into().map_err(|_| {
        ErrorKind::ValueError(format!(
            "Wrong number of arguments: expected {}, got {}",
            N,
            args.len()
        ))
        .into()
    })
}

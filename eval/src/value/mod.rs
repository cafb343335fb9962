//! The backing representation of runtime values.
//!
//! Every value is one variant of [`Value`]; large payloads are boxed
//! behind `Rc` and immutable once constructed. Each variant is
//! associated with a [`Type`] descriptor from the engine's [`Types`]
//! registry, which drives attribute access and operator dispatch.

use std::fmt::{self, Display};
use std::rc::Rc;

use bstr::BStr;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

mod builtin;
mod dict;
mod function;
mod thunk;
mod types;

pub use builtin::{BoundMethod, Builtin, Property};
pub(crate) use builtin::check_arity;
pub use dict::Dict;
pub use function::{Function, Signature};
pub use thunk::{Thunk, ThunkKind};
pub use types::{Type, Types};

use crate::chunk::Code;
use crate::engine::{DollarName, ExecutionEngine};
use crate::errors::{ErrorKind, EvalResult};
use crate::vm::Frame;

/// An environment: a mapping from names to values (or thunks standing
/// in for values).
pub type EnvMap = FxHashMap<SmolStr, Value>;

/// A module is a named environment produced by executing a code unit.
#[derive(Debug)]
pub struct Module {
    pub name: SmolStr,
    pub bindings: EnvMap,
}

/// Iterator state over a list, following the `[next_iter, item]`
/// iteration protocol.
#[derive(Debug)]
pub struct ListIter {
    pub list: Rc<Vec<Value>>,
    pub position: usize,
}

/// Iterator state over the lazy child-name sequence of a dollar name.
#[derive(Debug)]
pub struct SubIter {
    pub name: DollarName,
    pub position: usize,
}

#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Bytes(Bytes),
    List(Rc<Vec<Value>>),
    Dict(Rc<Dict>),
    BoundMethod(Rc<BoundMethod>),
    Property(Rc<Property>),
    Builtin(Rc<Builtin>),
    Function(Rc<Function>),
    Signature(Rc<Signature>),
    Code(Rc<Code>),
    Frame(Rc<Frame>),
    Module(Rc<Module>),
    Env(Rc<EnvMap>),
    Type(Rc<Type>),
    ListIter(Rc<ListIter>),
    SubIter(Rc<SubIter>),
    Thunk(Thunk),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Dict(_) => "Dict",
            Value::BoundMethod(_) => "BoundMethod",
            Value::Property(_) => "Property",
            Value::Builtin(_) => "BuiltinFunction",
            Value::Function(_) => "Function",
            Value::Signature(_) => "Signature",
            Value::Code(_) => "Code",
            Value::Frame(_) => "Frame",
            Value::Module(_) => "Module",
            Value::Env(_) => "Env",
            Value::Type(_) => "Type",
            Value::ListIter(_) => "ListIterator",
            Value::SubIter(_) => "SubIter",
            Value::Thunk(_) => "Thunk",
        }
    }

    /// The type descriptor driving attribute lookup for this value.
    pub fn type_(&self, types: &Types) -> Rc<Type> {
        match self {
            Value::None => types.none.clone(),
            Value::Bool(_) => types.boolean.clone(),
            Value::Integer(_) => types.integer.clone(),
            Value::Float(_) => types.float.clone(),
            Value::String(_) => types.string.clone(),
            Value::Bytes(_) => types.bytes.clone(),
            Value::List(_) => types.list.clone(),
            Value::Dict(_) => types.dict.clone(),
            Value::BoundMethod(_) => types.bound_method.clone(),
            Value::Property(_) => types.property.clone(),
            Value::Builtin(_) => types.builtin.clone(),
            Value::Function(_) => types.function.clone(),
            Value::Signature(_) => types.signature.clone(),
            Value::Code(_) => types.code.clone(),
            Value::Frame(_) => types.frame.clone(),
            Value::Module(_) => types.module.clone(),
            Value::Env(_) => types.env.clone(),
            Value::Type(_) => types.type_.clone(),
            Value::ListIter(_) => types.list_iter.clone(),
            Value::SubIter(_) => types.sub_iter.clone(),
            Value::Thunk(_) => types.thunk.clone(),
        }
    }

    /// Truthiness: `none`, `false` and numeric zero are falsy,
    /// everything else is truthy.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            _ => true,
        }
    }

    /// Reference identity; scalar variants are their own identity.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Bytes(a), Value::Bytes(b)) => a.as_ptr() == b.as_ptr() && a.len() == b.len(),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            (Value::Property(a), Value::Property(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Signature(a), Value::Signature(b)) => Rc::ptr_eq(a, b),
            (Value::Code(a), Value::Code(b)) => Rc::ptr_eq(a, b),
            (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Env(a), Value::Env(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => Rc::ptr_eq(a, b),
            (Value::ListIter(a), Value::ListIter(b)) => Rc::ptr_eq(a, b),
            (Value::SubIter(a), Value::SubIter(b)) => Rc::ptr_eq(a, b),
            (Value::Thunk(a), Value::Thunk(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn type_error(&self, expected: &'static str) -> ErrorKind {
        ErrorKind::TypeError(format!(
            "Expected {}, got '{}'",
            expected,
            self.type_name()
        ))
    }

    pub fn as_int(&self) -> EvalResult<i64> {
        match self {
            Value::Integer(n) => Ok(*n),
            other => Err(other.type_error("an Integer").into()),
        }
    }

    pub fn as_str(&self) -> EvalResult<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.type_error("a String").into()),
        }
    }

    pub fn as_bytes(&self) -> EvalResult<&Bytes> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(other.type_error("Bytes").into()),
        }
    }

    pub fn as_list(&self) -> EvalResult<&Rc<Vec<Value>>> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(other.type_error("a List").into()),
        }
    }

    pub fn as_dict(&self) -> EvalResult<&Rc<Dict>> {
        match self {
            Value::Dict(d) => Ok(d),
            other => Err(other.type_error("a Dict").into()),
        }
    }

    pub fn as_code(&self) -> EvalResult<&Rc<Code>> {
        match self {
            Value::Code(c) => Ok(c),
            other => Err(other.type_error("a Code object").into()),
        }
    }

    pub fn as_env(&self) -> EvalResult<&Rc<EnvMap>> {
        match self {
            Value::Env(e) => Ok(e),
            other => Err(other.type_error("an Env").into()),
        }
    }

    pub fn as_signature(&self) -> EvalResult<&Rc<Signature>> {
        match self {
            Value::Signature(s) => Ok(s),
            other => Err(other.type_error("a Signature").into()),
        }
    }

    /// A numeric reading of the value, for mixed-type float
    /// arithmetic.
    pub(crate) fn numeric_value(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Look up `name` through this value's type, binding builtins to
    /// the receiver. Properties are returned unevaluated; see
    /// [`Value::getattr`] for the access path that invokes them.
    pub fn get_method(&self, engine: &ExecutionEngine, name: &str) -> EvalResult<Value> {
        let ty = self.type_(engine.types());
        match ty.lookup(name).cloned() {
            None => Err(ErrorKind::NameError(format!(
                "Object of type '{}' has no attribute '{}'",
                ty.name(),
                name
            ))
            .into()),
            Some(attr @ Value::Builtin(_)) => Ok(Value::BoundMethod(Rc::new(BoundMethod {
                receiver: self.clone(),
                func: attr,
            }))),
            Some(other) => Ok(other),
        }
    }

    /// Like [`Value::get_method`], but starting the MRO walk at
    /// `start` instead of at the value's own type.
    pub fn get_super_method(
        &self,
        engine: &ExecutionEngine,
        start: &Rc<Type>,
        name: &str,
    ) -> EvalResult<Value> {
        let ty = self.type_(engine.types());
        let mro = ty.mro();
        let tail: &[Rc<Type>] = if Rc::ptr_eq(&ty, start) {
            mro
        } else {
            match mro.iter().position(|t| Rc::ptr_eq(t, start)) {
                Some(i) => &mro[i..],
                None => &[],
            }
        };

        for candidate in tail {
            if let Some(attr) = candidate.attr(name) {
                return Ok(match attr {
                    Value::Builtin(_) => Value::BoundMethod(Rc::new(BoundMethod {
                        receiver: self.clone(),
                        func: attr.clone(),
                    })),
                    other => other.clone(),
                });
            }
        }

        Err(ErrorKind::NameError(format!(
            "Super object of type '{}' using super of '{}' has no attribute '{}'",
            ty.name(),
            start.name(),
            name
        ))
        .into())
    }

    /// Attribute access: modules consult their bindings first, types
    /// their own attribute table, and everything else goes through
    /// the type's MRO. Properties are invoked with the receiver.
    pub fn getattr(&self, engine: &ExecutionEngine, name: &str) -> EvalResult<Value> {
        if let Value::Module(module) = self {
            if let Some(value) = module.bindings.get(name) {
                return Ok(value.clone());
            }
        }

        if let Value::Type(ty) = self {
            if let Some(attr) = ty.attr(name) {
                return Ok(attr.clone());
            }
        }

        match self.get_method(engine, name)? {
            Value::Property(prop) => prop.func.call(engine, &[self.clone()]),
            other => Ok(other),
        }
    }

    /// Invoke this value as a callable.
    pub fn call(&self, engine: &ExecutionEngine, args: &[Value]) -> EvalResult<Value> {
        match self {
            Value::Builtin(builtin) => builtin.call(engine, args),

            Value::BoundMethod(bound) => {
                let mut bound_args = Vec::with_capacity(args.len() + 1);
                bound_args.push(bound.receiver.clone());
                bound_args.extend_from_slice(args);
                bound.func.call(engine, &bound_args)
            }

            Value::Property(prop) => prop.func.call(engine, args),

            Value::Function(func) => func.call(engine, args),

            // Types are constructed through their `__new__` attribute.
            Value::Type(_) => {
                let ctor = self.getattr(engine, "__new__")?;
                ctor.call(engine, args)
            }

            other => Err(ErrorKind::TypeError(format!(
                "'{}' object is not callable",
                other.type_name()
            ))
            .into()),
        }
    }
}

/// Equality as defined by the object model: dispatch `==` on the
/// left operand, falling back to the reflected operator if the left
/// side refuses.
pub(crate) fn dispatch_eq(
    engine: &ExecutionEngine,
    lhs: &Value,
    rhs: &Value,
) -> EvalResult<bool> {
    match lhs.get_method(engine, "==")?.call(engine, &[rhs.clone()]) {
        Ok(result) => Ok(result.to_bool()),
        Err(err) if err.kind.is_unsupported_operation() => {
            let result = rhs.get_method(engine, "r==")?.call(engine, &[lhs.clone()])?;
            Ok(result.to_bool())
        }
        Err(err) => Err(err),
    }
}

/// Structural equality for tests and the wire codec. Behavioural
/// equality of running programs goes through [`dispatch_eq`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            _ => self.ptr_eq(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("NONE"),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "Bytes({:?})", BStr::new(b)),

            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt(f)?;
                }
                write!(f, "]")
            }

            Value::Dict(dict) => dict.fmt(f),
            Value::BoundMethod(b) => b.fmt(f),
            Value::Property(p) => p.fmt(f),
            Value::Builtin(b) => b.fmt(f),
            Value::Function(func) => func.fmt(f),
            Value::Signature(sig) => sig.fmt(f),
            Value::Code(code) => write!(f, "Code({})", code.modulename()),
            Value::Frame(frame) => {
                write!(f, "Frame({}-{})", frame.position(), frame.limit())
            }
            Value::Module(module) => write!(f, "Module({})", module.name),
            Value::Env(env) => write!(f, "Env({})", env.len()),
            Value::Type(ty) => write!(f, "Type({})", ty.name()),
            Value::ListIter(it) => write!(f, "ListIterator(@{})", it.position),
            Value::SubIter(it) => write!(f, "SubIter({}@{})", it.name, it.position),
            Value::Thunk(thunk) => thunk.fmt(f),
        }
    }
}

//! Type descriptors and the built-in type registry.
//!
//! A [`Type`] carries its bases, the C3 linearization of those bases
//! and an attribute table of plain values (mostly builtins and
//! properties). The root `Object` type defines the universal operator
//! table: comparisons are derived from the three-way `<=>`, binary
//! operators default to raising `UnsupportedOperation`, and every
//! reflected operator is mapped back onto a forward operator of the
//! receiver.
//!
//! All descriptors live in a [`Types`] registry owned by the engine;
//! values find their descriptor by variant, which also gives the
//! registry's own `Type` descriptor its self-typed root behaviour
//! without a reference cycle.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::engine::ExecutionEngine;
use crate::errors::{ErrorKind, EvalResult};

use super::builtin::check_arity;
use super::{dispatch_eq, Builtin, ListIter, Property, Value};

#[derive(Debug)]
pub struct Type {
    name: SmolStr,
    bases: Vec<Rc<Type>>,
    mro: Vec<Rc<Type>>,
    attrs: FxHashMap<SmolStr, Value>,
}

impl Type {
    pub fn new(
        name: &str,
        bases: Vec<Rc<Type>>,
        attrs: Vec<(&str, Value)>,
    ) -> Result<Rc<Type>, ErrorKind> {
        let mro = c3_linearize(name, &bases)?;
        Ok(Rc::new(Type {
            name: name.into(),
            bases,
            mro,
            attrs: attrs
                .into_iter()
                .map(|(key, value)| (SmolStr::from(key), value))
                .collect(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bases(&self) -> &[Rc<Type>] {
        &self.bases
    }

    /// The linearization of the bases, ending in `Object` for every
    /// type but `Object` itself.
    pub fn mro(&self) -> &[Rc<Type>] {
        &self.mro
    }

    /// The full method resolution order: the type itself, then its
    /// linearized bases.
    pub fn linearization(self: &Rc<Self>) -> Vec<Rc<Type>> {
        std::iter::once(self.clone())
            .chain(self.mro.iter().cloned())
            .collect()
    }

    /// This type's own attribute table, without consulting bases.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Attribute lookup along the full method resolution order.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        if let Some(attr) = self.attrs.get(name) {
            return Some(attr);
        }
        self.mro.iter().find_map(|base| base.attrs.get(name))
    }
}

/// C3 superclass linearization of `bases`. The merge consumes the
/// linearization of every base plus the base list itself, preserving
/// local precedence; an empty merge step means the hierarchy is
/// ambiguous.
fn c3_linearize(name: &str, bases: &[Rc<Type>]) -> Result<Vec<Rc<Type>>, ErrorKind> {
    let mut sequences: Vec<Vec<Rc<Type>>> = bases
        .iter()
        .map(|base| {
            let mut seq = vec![base.clone()];
            seq.extend(base.mro.iter().cloned());
            seq
        })
        .collect();
    if bases.len() > 1 {
        sequences.push(bases.to_vec());
    }

    let mut mro = Vec::new();
    while !sequences.is_empty() {
        let mut candidate = None;
        for seq in &sequences {
            let head = &seq[0];
            let in_a_tail = sequences
                .iter()
                .any(|other| other[1..].iter().any(|t| Rc::ptr_eq(t, head)));
            if !in_a_tail {
                candidate = Some(head.clone());
                break;
            }
        }

        let candidate = candidate.ok_or_else(|| {
            ErrorKind::MroConflict(format!(
                "inconsistent hierarchy while constructing '{}'",
                name
            ))
        })?;

        mro.push(candidate.clone());
        for seq in sequences.iter_mut() {
            seq.retain(|t| !Rc::ptr_eq(t, &candidate));
        }
        sequences.retain(|seq| !seq.is_empty());
    }

    Ok(mro)
}

/// The registry of built-in type descriptors.
pub struct Types {
    pub object: Rc<Type>,
    pub type_: Rc<Type>,
    pub numeric: Rc<Type>,
    pub integer: Rc<Type>,
    pub float: Rc<Type>,
    pub boolean: Rc<Type>,
    pub none: Rc<Type>,
    pub string: Rc<Type>,
    pub bytes: Rc<Type>,
    pub list: Rc<Type>,
    pub list_iter: Rc<Type>,
    pub dict: Rc<Type>,
    pub bound_method: Rc<Type>,
    pub property: Rc<Type>,
    pub builtin: Rc<Type>,
    pub function: Rc<Type>,
    pub signature: Rc<Type>,
    pub code: Rc<Type>,
    pub frame: Rc<Type>,
    pub module: Rc<Type>,
    pub env: Rc<Type>,
    pub thunk: Rc<Type>,
    pub sub_iter: Rc<Type>,

    // The raisable error hierarchy.
    pub error: Rc<Type>,
    pub type_error: Rc<Type>,
    pub unsupported_operation: Rc<Type>,
    pub name_error: Rc<Type>,
    pub index_error: Rc<Type>,
    pub value_error: Rc<Type>,
    pub assertion_error: Rc<Type>,
}

pub(crate) fn unsupported_op_error(lhs: &Value, rhs: &Value, op: &str) -> ErrorKind {
    ErrorKind::UnsupportedOperation(format!(
        "Objects of types '{}' and '{}' do not support the operator '{}'",
        lhs.type_name(),
        rhs.type_name(),
        op
    ))
}

/// An operator entry that always refuses.
fn unsupported(op: &'static str) -> Value {
    Builtin::new(op, move |_, args| {
        let [lhs, rhs] = check_arity(args)?;
        Err(unsupported_op_error(lhs, rhs, op).into())
    })
}

/// A reflected operator delegating to a forward operator on the
/// receiver.
fn delegate(op: &'static str, target: &'static str) -> Value {
    Builtin::new(op, move |engine, args| {
        let [receiver, arg] = check_arity(args)?;
        receiver
            .get_method(engine, target)?
            .call(engine, &[arg.clone()])
    })
}

/// Three-way comparison through the object model.
fn three_way(engine: &ExecutionEngine, lhs: &Value, rhs: &Value) -> EvalResult<i64> {
    lhs.get_method(engine, "<=>")?
        .call(engine, &[rhs.clone()])?
        .as_int()
}

/// A comparison operator derived from `<=>`.
fn ordering_op(op: &'static str, accept: fn(i64) -> bool) -> Value {
    Builtin::new(op, move |engine, args| {
        let [lhs, rhs] = check_arity(args)?;
        Ok(Value::Bool(accept(three_way(engine, lhs, rhs)?)))
    })
}

fn object_type() -> Rc<Type> {
    let attrs = vec![
        ("<=>", unsupported("<=>")),
        // Equality falls back to reference identity when the operands
        // are unordered.
        (
            "==",
            Builtin::new("==", |engine, args| {
                let [lhs, rhs] = check_arity(args)?;
                match three_way(engine, lhs, rhs) {
                    Ok(c) => Ok(Value::Bool(c == 0)),
                    Err(err) if err.kind.is_unsupported_operation() => {
                        Ok(Value::Bool(lhs.ptr_eq(rhs)))
                    }
                    Err(err) => Err(err),
                }
            }),
        ),
        (
            "!=",
            Builtin::new("!=", |engine, args| {
                let [lhs, rhs] = check_arity(args)?;
                let eq = lhs.get_method(engine, "==")?.call(engine, &[rhs.clone()])?;
                Ok(Value::Bool(!eq.to_bool()))
            }),
        ),
        ("<", ordering_op("<", |c| c == -1)),
        (">", ordering_op(">", |c| c == 1)),
        ("<=", ordering_op("<=", |c| c != 1)),
        (">=", ordering_op(">=", |c| c != -1)),
        ("r==", delegate("r==", "==")),
        ("r!=", delegate("r!=", "!=")),
        // Reflected comparisons mirror the operator: `x < y` asked of
        // `y` is `y > x`.
        ("r<", delegate("r<", ">")),
        ("r>", delegate("r>", "<")),
        ("r<=", delegate("r<=", ">=")),
        ("r>=", delegate("r>=", "<=")),
        ("+", unsupported("+")),
        ("r+", delegate("r+", "+")),
        ("-", unsupported("-")),
        (
            "r-",
            Builtin::new("r-", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let diff = receiver
                    .get_method(engine, "-")?
                    .call(engine, &[arg.clone()])?;
                diff.get_method(engine, "u-")?.call(engine, &[])
            }),
        ),
        ("*", unsupported("*")),
        ("r*", delegate("r*", "*")),
        ("/", unsupported("/")),
        ("r/", unsupported("r/")),
        ("//", unsupported("//")),
        ("r//", unsupported("r//")),
        ("%", unsupported("%")),
        ("r%", unsupported("r%")),
        ("**", unsupported("**")),
        ("r**", unsupported("r**")),
        ("[]", unsupported("[]")),
        (
            "__type__",
            Property::new(Builtin::new("__type__", |engine, args| {
                let [receiver] = check_arity(args)?;
                Ok(Value::Type(receiver.type_(engine.types())))
            })),
        ),
    ];

    Type::new("Object", vec![], attrs).expect("Object type has no bases to linearize")
}

/// Construct a type, asserting that the built-in hierarchy is
/// consistent (it is, by construction).
fn builtin_type(name: &str, bases: Vec<Rc<Type>>, attrs: Vec<(&str, Value)>) -> Rc<Type> {
    Type::new(name, bases, attrs).expect("builtin type hierarchy is consistent")
}

/// An integer operator: fast path for integer operands, super
/// dispatch otherwise.
fn int_op(name: &'static str, f: fn(i64, i64) -> EvalResult<Value>) -> Value {
    Builtin::new(name, move |engine, args| {
        let [receiver, arg] = check_arity(args)?;
        let lhs = receiver.as_int()?;
        match arg {
            Value::Integer(rhs) => f(lhs, *rhs),
            _ => receiver
                .get_super_method(engine, &engine.types().integer, name)?
                .call(engine, &[arg.clone()]),
        }
    })
}

/// A float operator accepting any numeric right operand.
fn float_op(name: &'static str, f: fn(f64, f64) -> Value) -> Value {
    Builtin::new(name, move |engine, args| {
        let [receiver, arg] = check_arity(args)?;
        let lhs = match receiver {
            Value::Float(x) => *x,
            other => return Err(other.type_error_for_float()),
        };
        match arg.numeric_value() {
            Some(rhs) => Ok(f(lhs, rhs)),
            None => receiver
                .get_super_method(engine, &engine.types().float, name)?
                .call(engine, &[arg.clone()]),
        }
    })
}

impl Value {
    fn type_error_for_float(&self) -> crate::errors::Error {
        ErrorKind::TypeError(format!("Expected a Float, got '{}'", self.type_name())).into()
    }
}

fn intpow(mut base: i64, mut exp: i64) -> i64 {
    let mut result: i64 = 1;
    while exp != 0 {
        if exp & 1 == 1 {
            result = result.wrapping_mul(base);
            exp -= 1;
        } else {
            base = base.wrapping_mul(base);
            exp >>= 1;
        }
    }
    result
}

fn cmp_value(a: f64, b: f64) -> Value {
    Value::Integer(if a == b {
        0
    } else if a < b {
        -1
    } else {
        1
    })
}

fn integer_type(numeric: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![
        (
            "u-",
            Builtin::new("u-", |_, args| {
                let [receiver] = check_arity(args)?;
                Ok(Value::Integer(receiver.as_int()?.wrapping_neg()))
            }),
        ),
        ("+", int_op("+", |a, b| Ok(Value::Integer(a.wrapping_add(b))))),
        ("-", int_op("-", |a, b| Ok(Value::Integer(a.wrapping_sub(b))))),
        ("*", int_op("*", |a, b| Ok(Value::Integer(a.wrapping_mul(b))))),
        (
            "/",
            int_op("/", |a, b| {
                if b == 0 {
                    return Err(ErrorKind::ValueError("division by zero".into()).into());
                }
                Ok(Value::Float(a as f64 / b as f64))
            }),
        ),
        (
            "//",
            int_op("//", |a, b| {
                if b == 0 {
                    return Err(ErrorKind::ValueError("division by zero".into()).into());
                }
                // Truncates toward zero, like float `//`.
                Ok(Value::Integer(a.wrapping_div(b)))
            }),
        ),
        (
            "%",
            int_op("%", |a, b| {
                if b == 0 {
                    return Err(ErrorKind::ValueError("division by zero".into()).into());
                }
                let rem = a.wrapping_rem(b);
                Ok(Value::Integer(if a < 0 { rem.wrapping_add(b) } else { rem }))
            }),
        ),
        (
            "**",
            int_op("**", |a, b| {
                if b < 0 {
                    return Err(
                        ErrorKind::ValueError("negative integer exponent".into()).into()
                    );
                }
                Ok(Value::Integer(intpow(a, b)))
            }),
        ),
        (
            "<=>",
            int_op("<=>", |a, b| Ok(Value::Integer((a.cmp(&b)) as i64))),
        ),
    ];
    builtin_type("Integer", vec![numeric.clone()], attrs)
}

fn float_type(numeric: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![
        (
            "u-",
            Builtin::new("u-", |_, args| {
                let [receiver] = check_arity(args)?;
                match receiver {
                    Value::Float(x) => Ok(Value::Float(-x)),
                    other => Err(other.type_error_for_float()),
                }
            }),
        ),
        ("+", float_op("+", |a, b| Value::Float(a + b))),
        ("-", float_op("-", |a, b| Value::Float(a - b))),
        ("*", float_op("*", |a, b| Value::Float(a * b))),
        ("/", float_op("/", |a, b| Value::Float(a / b))),
        ("r/", float_op("r/", |a, b| Value::Float(b / a))),
        ("//", float_op("//", |a, b| Value::Integer((a / b) as i64))),
        ("r//", float_op("r//", |a, b| Value::Integer((b / a) as i64))),
        ("%", float_op("%", |a, b| Value::Float(a % b))),
        ("r%", float_op("r%", |a, b| Value::Float(b % a))),
        ("**", float_op("**", |a, b| Value::Float(a.powf(b)))),
        ("r**", float_op("r**", |a, b| Value::Float(b.powf(a)))),
        (
            "<=>",
            Builtin::new("<=>", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let lhs = match receiver {
                    Value::Float(x) => *x,
                    other => return Err(other.type_error_for_float()),
                };
                match arg {
                    Value::Float(rhs) => Ok(cmp_value(lhs, *rhs)),
                    Value::Integer(rhs) => Ok(cmp_value(lhs, *rhs as f64)),
                    _ => receiver
                        .get_super_method(engine, &engine.types().float, "<=>")?
                        .call(engine, &[arg.clone()]),
                }
            }),
        ),
        (
            "__new__",
            Builtin::new("__new__", |_, args| {
                let [arg] = check_arity(args)?;
                match arg.numeric_value() {
                    Some(x) => Ok(Value::Float(x)),
                    None => Err(ErrorKind::TypeError(format!(
                        "Cannot convert '{}' to Float",
                        arg.type_name()
                    ))
                    .into()),
                }
            }),
        ),
    ];
    builtin_type("Float", vec![numeric.clone()], attrs)
}

fn string_type(object: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![
        (
            "+",
            Builtin::new("+", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let lhs = receiver.as_str()?;
                match arg {
                    Value::String(rhs) => {
                        let mut out = String::with_capacity(lhs.len() + rhs.len());
                        out.push_str(lhs);
                        out.push_str(rhs);
                        Ok(Value::from(out.as_str()))
                    }
                    _ => receiver
                        .get_super_method(engine, &engine.types().string, "+")?
                        .call(engine, &[arg.clone()]),
                }
            }),
        ),
        (
            "*",
            Builtin::new("*", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let lhs = receiver.as_str()?;
                match arg {
                    Value::Integer(n) => {
                        let count = (*n).max(0) as usize;
                        Ok(Value::from(lhs.repeat(count).as_str()))
                    }
                    _ => receiver
                        .get_super_method(engine, &engine.types().string, "*")?
                        .call(engine, &[arg.clone()]),
                }
            }),
        ),
        (
            "==",
            Builtin::new("==", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let lhs = receiver.as_str()?;
                match arg {
                    Value::String(rhs) => Ok(Value::Bool(lhs == rhs.as_ref())),
                    _ => receiver
                        .get_super_method(engine, &engine.types().string, "==")?
                        .call(engine, &[arg.clone()]),
                }
            }),
        ),
    ];
    builtin_type("String", vec![object.clone()], attrs)
}

fn bytes_type(object: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![
        (
            "+",
            Builtin::new("+", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let lhs = receiver.as_bytes()?;
                match arg {
                    Value::Bytes(rhs) => {
                        let mut out = Vec::with_capacity(lhs.len() + rhs.len());
                        out.extend_from_slice(lhs);
                        out.extend_from_slice(rhs);
                        Ok(Value::Bytes(bytes::Bytes::from(out)))
                    }
                    _ => receiver
                        .get_super_method(engine, &engine.types().bytes, "+")?
                        .call(engine, &[arg.clone()]),
                }
            }),
        ),
        (
            "*",
            Builtin::new("*", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let lhs = receiver.as_bytes()?;
                match arg {
                    Value::Integer(n) => {
                        let count = (*n).max(0) as usize;
                        Ok(Value::Bytes(bytes::Bytes::from(lhs.repeat(count))))
                    }
                    _ => receiver
                        .get_super_method(engine, &engine.types().bytes, "*")?
                        .call(engine, &[arg.clone()]),
                }
            }),
        ),
        (
            "==",
            Builtin::new("==", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let lhs = receiver.as_bytes()?;
                match arg {
                    Value::Bytes(rhs) => Ok(Value::Bool(lhs == rhs)),
                    _ => receiver
                        .get_super_method(engine, &engine.types().bytes, "==")?
                        .call(engine, &[arg.clone()]),
                }
            }),
        ),
    ];
    builtin_type("Bytes", vec![object.clone()], attrs)
}

fn list_type(object: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![
        (
            "[]",
            Builtin::new("[]", |_, args| {
                let [receiver, index] = check_arity(args)?;
                let items = receiver.as_list()?;
                let idx = index.as_int()?;
                if idx < 0 || idx as usize >= items.len() {
                    return Err(
                        ErrorKind::IndexError("Index is out of bounds".into()).into()
                    );
                }
                Ok(items[idx as usize].clone())
            }),
        ),
        (
            "__iter__",
            Builtin::new("__iter__", |_, args| {
                let [receiver] = check_arity(args)?;
                Ok(Value::ListIter(Rc::new(ListIter {
                    list: receiver.as_list()?.clone(),
                    position: 0,
                })))
            }),
        ),
        (
            "==",
            Builtin::new("==", |engine, args| {
                let [receiver, arg] = check_arity(args)?;
                let lhs = receiver.as_list()?;
                match arg {
                    Value::List(rhs) => {
                        if lhs.len() != rhs.len() {
                            return Ok(Value::Bool(false));
                        }
                        for (a, b) in lhs.iter().zip(rhs.iter()) {
                            if !dispatch_eq(engine, a, b)? {
                                return Ok(Value::Bool(false));
                            }
                        }
                        Ok(Value::Bool(true))
                    }
                    _ => receiver
                        .get_super_method(engine, &engine.types().list, "==")?
                        .call(engine, &[arg.clone()]),
                }
            }),
        ),
        (
            ":+",
            Builtin::new(":+", |_, args| {
                let [receiver, arg] = check_arity(args)?;
                let mut items = receiver.as_list()?.as_ref().clone();
                items.push(arg.clone());
                Ok(Value::List(Rc::new(items)))
            }),
        ),
    ];
    builtin_type("List", vec![object.clone()], attrs)
}

fn list_iter_type(object: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![
        (
            "__iter__",
            Builtin::new("__iter__", |_, args| {
                let [receiver] = check_arity(args)?;
                Ok(receiver.clone())
            }),
        ),
        (
            "__next__",
            Builtin::new("__next__", |_, args| {
                let [receiver] = check_arity(args)?;
                let it = match receiver {
                    Value::ListIter(it) => it,
                    other => {
                        return Err(ErrorKind::TypeError(format!(
                            "Expected a ListIterator, got '{}'",
                            other.type_name()
                        ))
                        .into())
                    }
                };
                if it.position >= it.list.len() {
                    return Ok(Value::None);
                }
                let next = Value::ListIter(Rc::new(ListIter {
                    list: it.list.clone(),
                    position: it.position + 1,
                }));
                Ok(Value::List(Rc::new(vec![
                    next,
                    it.list[it.position].clone(),
                ])))
            }),
        ),
    ];
    builtin_type("ListIterator", vec![object.clone()], attrs)
}

fn dict_type(object: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![(
        "[]",
        Builtin::new("[]", |_, args| {
            let [receiver, key] = check_arity(args)?;
            match receiver.as_dict()?.get(key) {
                Some(value) => Ok(value.clone()),
                None => Err(ErrorKind::IndexError("No such key".into()).into()),
            }
        }),
    )];
    builtin_type("Dict", vec![object.clone()], attrs)
}

fn sub_iter_type(object: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![
        (
            "__iter__",
            Builtin::new("__iter__", |_, args| {
                let [receiver] = check_arity(args)?;
                Ok(receiver.clone())
            }),
        ),
        // Yields a sub-thunk the engine finalizes with the next child
        // (or `none` once the parent is resolved).
        (
            "__next__",
            Builtin::new("__next__", |engine, args| {
                let [receiver] = check_arity(args)?;
                let it = match receiver {
                    Value::SubIter(it) => it,
                    other => {
                        return Err(ErrorKind::TypeError(format!(
                            "Expected a SubIter, got '{}'",
                            other.type_name()
                        ))
                        .into())
                    }
                };
                Ok(engine.make_sub_thunk(it.name.clone(), it.position))
            }),
        ),
    ];
    builtin_type("SubIter", vec![object.clone()], attrs)
}

fn signature_type(object: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![(
        "__new__",
        Builtin::new("__new__", |_, args| {
            let [names, defaults, flags] = check_arity(args)?;
            let names = names
                .as_list()?
                .iter()
                .map(|name| Ok(SmolStr::from(name.as_str()?)))
                .collect::<EvalResult<Vec<_>>>()?;
            let defaults = defaults.as_list()?.as_ref().clone();
            if defaults.len() > names.len() {
                return Err(ErrorKind::ValueError(
                    "more defaults than parameter names".into(),
                )
                .into());
            }
            Ok(Value::Signature(Rc::new(super::Signature {
                names,
                defaults,
                flags: flags.as_int()? as u8,
            })))
        }),
    )];
    builtin_type("Signature", vec![object.clone()], attrs)
}

fn function_type(object: &Rc<Type>) -> Rc<Type> {
    let attrs = vec![(
        "signature",
        Property::new(Builtin::new("signature", |_, args| {
            let [receiver] = check_arity(args)?;
            match receiver {
                Value::Function(func) => Ok(Value::Signature(func.signature.clone())),
                other => Err(ErrorKind::TypeError(format!(
                    "Expected a Function, got '{}'",
                    other.type_name()
                ))
                .into()),
            }
        })),
    )];
    builtin_type("Function", vec![object.clone()], attrs)
}

impl Types {
    pub fn new() -> Rc<Types> {
        let object = object_type();
        let plain = |name: &str| builtin_type(name, vec![object.clone()], vec![]);

        let numeric = plain("Numeric");
        let integer = integer_type(&numeric);
        let float = float_type(&numeric);
        let boolean = builtin_type("Boolean", vec![numeric.clone()], vec![]);

        let error = plain("Error");
        let type_error = builtin_type("TypeError", vec![error.clone()], vec![]);
        let unsupported_operation =
            builtin_type("UnsupportedOperation", vec![type_error.clone()], vec![]);

        Rc::new(Types {
            type_: plain("Type"),
            numeric,
            integer,
            float,
            boolean,
            none: plain("NoneType"),
            string: string_type(&object),
            bytes: bytes_type(&object),
            list: list_type(&object),
            list_iter: list_iter_type(&object),
            dict: dict_type(&object),
            bound_method: plain("BoundMethod"),
            property: plain("Property"),
            builtin: plain("BuiltinFunction"),
            function: function_type(&object),
            signature: signature_type(&object),
            code: plain("Code"),
            frame: plain("Frame"),
            module: plain("Module"),
            env: plain("Env"),
            thunk: plain("Thunk"),
            sub_iter: sub_iter_type(&object),
            name_error: builtin_type("NameError", vec![error.clone()], vec![]),
            index_error: builtin_type("IndexError", vec![error.clone()], vec![]),
            value_error: builtin_type("ValueError", vec![error.clone()], vec![]),
            assertion_error: builtin_type("AssertionError", vec![error.clone()], vec![]),
            error,
            type_error,
            unsupported_operation,
            object,
        })
    }
}

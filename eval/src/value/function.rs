//! User-defined functions and their call signatures.

use std::fmt::{self, Display};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::chunk::Code;
use crate::engine::ExecutionEngine;
use crate::errors::{ErrorKind, EvalResult};
use crate::vm::Frame;

use super::{EnvMap, Value};

/// The formal parameters of a function: names in declaration order,
/// with `defaults` supplying values for the trailing names.
#[derive(Debug)]
pub struct Signature {
    pub names: Vec<SmolStr>,
    pub defaults: Vec<Value>,
    pub flags: u8,
}

impl Signature {
    /// Flag bit: the last positional name collects surplus arguments.
    pub const VARARGS: u8 = 1;

    /// Flag bit: the last name collects surplus keyword arguments.
    pub const VARKWARGS: u8 = 2;

    /// Smallest number of positional arguments a call must supply.
    pub fn required(&self) -> usize {
        self.names.len() - self.defaults.len()
    }
}

/// Renders the declaration shape, with the name layout
/// `plain..., *varargs, defaulted..., **varkwargs` implied by the
/// flag bits.
impl Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(")?;

        let mut names: &[SmolStr] = &self.names;
        let varkwargs = if self.flags & Signature::VARKWARGS != 0 {
            names.split_last().map(|(last, rest)| {
                names = rest;
                last
            })
        } else {
            None
        };

        let defaulted_start = names.len().saturating_sub(self.defaults.len());
        let varargs_at = if self.flags & Signature::VARARGS != 0 && defaulted_start > 0 {
            Some(defaulted_start - 1)
        } else {
            None
        };

        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if Some(i) == varargs_at {
                write!(f, "*{}", name)?;
            } else if i >= defaulted_start {
                write!(f, "{}={}", name, self.defaults[i - defaulted_start])?;
            } else {
                write!(f, "{}", name)?;
            }
        }

        if let Some(name) = varkwargs {
            if !names.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "**{}", name)?;
        }

        write!(f, ")")
    }
}

/// A function compiled from user code: a region of a [`Code`] unit
/// together with the environment captured at its definition site.
#[derive(Debug)]
pub struct Function {
    pub code: Rc<Code>,
    pub offset: usize,
    pub signature: Rc<Signature>,
    pub env: EnvMap,
}

impl Function {
    /// Bind `args` against the signature and execute the function's
    /// frame. The call result is the `return` binding of the final
    /// environment; if the frame suspends, that binding is a thunk
    /// and laziness propagates to the caller.
    pub(crate) fn call(&self, engine: &ExecutionEngine, args: &[Value]) -> EvalResult<Value> {
        let sig = &self.signature;
        if args.len() > sig.names.len() || args.len() < sig.required() {
            return Err(ErrorKind::ValueError(format!(
                "Wrong number of arguments: {} takes {}..={}, got {}",
                sig,
                sig.required(),
                sig.names.len(),
                args.len()
            ))
            .into());
        }

        let mut env = self.env.clone();
        for (name, arg) in sig.names.iter().zip(args) {
            env.insert(name.clone(), arg.clone());
        }
        for (i, name) in sig.names.iter().enumerate().skip(args.len()) {
            env.insert(name.clone(), sig.defaults[i - sig.required()].clone());
        }

        let frame = Frame::new(self.code.clone(), self.offset, env);
        let mut result = frame.execute(engine)?;
        Ok(result.remove("return").unwrap_or(Value::None))
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("F(?)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(names: &[&str], defaults: Vec<Value>) -> Signature {
        Signature {
            names: names.iter().map(|n| SmolStr::from(*n)).collect(),
            defaults,
            flags: 0,
        }
    }

    #[test]
    fn display_marks_defaulted_names() {
        let s = sig(&["a", "b"], vec![Value::Integer(3)]);
        assert_eq!(s.to_string(), "Signature(a, b=3)");
    }

    #[test]
    fn display_marks_varargs_and_varkwargs() {
        let s = Signature {
            names: vec!["a".into(), "xs".into(), "b".into(), "kw".into()],
            defaults: vec![Value::Integer(3)],
            flags: Signature::VARARGS | Signature::VARKWARGS,
        };
        assert_eq!(s.to_string(), "Signature(a, *xs, b=3, **kw)");
    }

    #[test]
    fn display_marks_a_lone_varkwargs() {
        let s = Signature {
            names: vec!["kw".into()],
            defaults: vec![],
            flags: Signature::VARKWARGS,
        };
        assert_eq!(s.to_string(), "Signature(**kw)");
    }

    #[test]
    fn required_window() {
        let s = sig(&["a", "b", "c"], vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(s.required(), 1);
    }
}

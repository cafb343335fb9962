//! Global builtin bindings available to every top-level environment.

use std::rc::Rc;

use crate::errors::ErrorKind;
use crate::value::{check_arity, Builtin, EnvMap, Function, Types, Value};

/// Construct the global builtin set. The engine composes these with
/// its own bindings (`$?`, `$=`, ...) when executing a code unit.
pub(crate) fn globals(types: &Types) -> EnvMap {
    let mut env = EnvMap::default();

    env.insert(
        "print".into(),
        Builtin::new("print", |_, args| {
            print!(" -> ");
            for arg in args {
                print!("{} ", arg);
            }
            println!();
            Ok(Value::Integer(0))
        }),
    );

    // Function construction: (code, offset, signature, env).
    env.insert(
        "->".into(),
        Builtin::new("->", |_, args| {
            let [code, offset, signature, env] = check_arity(args)?;
            Ok(Value::Function(Rc::new(Function {
                code: code.as_code()?.clone(),
                offset: usize::try_from(offset.as_int()?).map_err(|_| {
                    ErrorKind::ValueError("function offset must be non-negative".into())
                })?,
                signature: signature.as_signature()?.clone(),
                env: env.as_env()?.as_ref().clone(),
            })))
        }),
    );

    env.insert(
        "[]".into(),
        Builtin::new("[]", |_, args| Ok(Value::List(Rc::new(args.to_vec())))),
    );

    env.insert(
        "assert".into(),
        Builtin::new("assert", |_, args| {
            let [condition] = check_arity(args)?;
            if !condition.to_bool() {
                return Err(ErrorKind::AssertionError("Assertion failed".into()).into());
            }
            Ok(Value::Integer(1))
        }),
    );

    env.insert("Signature".into(), Value::Type(types.signature.clone()));

    env
}

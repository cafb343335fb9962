//! End-to-end tests driving the engine over hand-assembled bytecode.
//!
//! Programs below are written the way the compiler emits them: every
//! statement-level call leaves its result on the stack and drops it,
//! so a thunk-returning engine call suspends the remainder of the
//! module, which the engine later resumes piece by piece.

use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::engine::{DollarName, ExecutionEngine, GET_PARTIAL, SET_DEFAULT, SET_MODIFICATION};
use crate::errors::ErrorKind;
use crate::opcode::{pack_halves, Op, SKIP_SENTINEL};
use crate::test_utils::CodeBuilder;
use crate::value::{EnvMap, Function, Signature, Value};
use crate::vm::Frame;

fn of(segments: &[&str]) -> DollarName {
    DollarName::of(segments)
}

/// `$=(<name>, <value already pushed by `value`>, <flags>)`, dropped.
fn stmt_set(
    b: CodeBuilder,
    name: &[&str],
    flags: i64,
    value: impl FnOnce(CodeBuilder) -> CodeBuilder,
) -> CodeBuilder {
    b.call_named("$=", 3, |b| {
        value(b.push_name(name)).op_const(Value::Integer(flags))
    })
    .op(Op::Drop, 1)
}

/// `<target> = $?(<name>, <flags>)`.
fn stmt_get(b: CodeBuilder, name: &[&str], flags: i64, target: &str) -> CodeBuilder {
    b.call_named("$?", 2, |b| {
        b.push_name(name).op_const(Value::Integer(flags))
    })
    .op_set(target)
}

#[test]
fn empty_program_produces_empty_output() {
    let engine = ExecutionEngine::new();
    engine.exec_code(CodeBuilder::new("empty").build()).unwrap();

    let values = engine.finish().unwrap();
    assert!(values.is_empty());
    assert_eq!(engine.resets(), 0);
}

#[test]
fn independent_sets() {
    let engine = ExecutionEngine::new();
    let code = {
        let b = CodeBuilder::new("m");
        let b = stmt_set(b, &["a"], 0, |b| b.op_const(Value::Integer(1)));
        let b = stmt_set(b, &["b"], 0, |b| b.op_const(Value::Integer(2)));
        b.build()
    };
    engine.exec_code(code).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["a"])], Value::Integer(1));
    assert_eq!(values[&of(&["b"])], Value::Integer(2));
    assert_eq!(values.len(), 2);
    assert_eq!(engine.resets(), 0);
}

#[test]
fn get_before_set_learns_an_ordering() {
    // A modification to `a` is only revealed once `b` resolves; the
    // first attempt commits `a` too early, learns `a` must wait for
    // `b`, and the second attempt converges.
    let engine = ExecutionEngine::new();

    let m1 = stmt_set(CodeBuilder::new("m1"), &["a"], 0, |b| {
        b.op_const(Value::Integer(1))
    })
    .build();

    let m2 = {
        let b = CodeBuilder::new("m2");
        let b = stmt_get(b, &["b"], 0, "w");
        let b = stmt_set(b, &["a"], SET_MODIFICATION as i64, |b| b.op_get("w"));
        b.build()
    };

    let m3 = stmt_set(CodeBuilder::new("m3"), &["b"], 0, |b| {
        b.op_const(Value::Integer(10))
    })
    .build();

    engine.exec_code(m1).unwrap();
    engine.exec_code(m2).unwrap();
    engine.exec_code(m3).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["a"])], Value::Integer(10));
    assert_eq!(values[&of(&["b"])], Value::Integer(10));
    assert_eq!(engine.resets(), 1);
}

#[test]
fn default_fallback() {
    let engine = ExecutionEngine::new();
    let code = stmt_set(CodeBuilder::new("m"), &["k"], SET_DEFAULT as i64, |b| {
        b.op_const(Value::Integer(7))
    })
    .build();
    engine.exec_code(code).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["k"])], Value::Integer(7));
    assert_eq!(values.len(), 1);
}

#[test]
fn default_is_ignored_when_an_initial_set_exists() {
    let engine = ExecutionEngine::new();
    let m1 = stmt_set(CodeBuilder::new("m1"), &["k"], SET_DEFAULT as i64, |b| {
        b.op_const(Value::Integer(7))
    })
    .build();
    let m2 = stmt_set(CodeBuilder::new("m2"), &["k"], 0, |b| {
        b.op_const(Value::Integer(3))
    })
    .build();
    engine.exec_code(m1).unwrap();
    engine.exec_code(m2).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["k"])], Value::Integer(3));
}

#[test]
fn alias_before_value() {
    let engine = ExecutionEngine::new();
    let code = {
        let b = CodeBuilder::new("m");
        // alias(["x"], ["y"])
        let b = b
            .call_named("alias", 2, |b| b.push_name(&["x"]).push_name(&["y"]))
            .op(Op::Drop, 1);
        let b = stmt_set(b, &["y"], 0, |b| b.op_const(Value::Integer(42)));
        let b = stmt_get(b, &["x"], 0, "v");
        let b = stmt_set(b, &["seen"], 0, |b| b.op_get("v"));
        b.build()
    };
    engine.exec_code(code).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["y"])], Value::Integer(42));
    assert!(!values.contains_key(&of(&["x"])));
    // The read of `x` dealiased to `y` and observed 42.
    assert_eq!(values[&of(&["seen"])], Value::Integer(42));
    assert_eq!(engine.resets(), 0);
}

#[test]
fn modification_after_initial_set_with_partial_read() {
    let engine = ExecutionEngine::new();
    let code = {
        let b = CodeBuilder::new("m");
        let b = stmt_set(b, &["c"], 0, |b| b.op_const(Value::Integer(1)));
        let b = stmt_get(b, &["c"], GET_PARTIAL as i64, "g");
        let b = stmt_set(b, &["c"], SET_MODIFICATION as i64, |b| {
            b.op_get("g").op_const(Value::Integer(1)).op_binop("+")
        });
        // Record what the partial read observed.
        let b = stmt_set(b, &["saw"], 0, |b| b.op_get("g"));
        b.build()
    };
    engine.exec_code(code).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["c"])], Value::Integer(2));
    assert_eq!(values[&of(&["saw"])], Value::Integer(1));
    assert_eq!(engine.resets(), 0);
}

#[test]
fn late_plain_set_is_fatal() {
    // The second plain set for `c` only surfaces while `c` is being
    // resolved.
    let engine = ExecutionEngine::new();
    let code = {
        let b = CodeBuilder::new("m");
        let b = stmt_set(b, &["c"], 0, |b| b.op_const(Value::Integer(1)));
        let b = stmt_set(b, &["c"], 0, |b| b.op_const(Value::Integer(2)));
        b.build()
    };
    engine.exec_code(code).unwrap();

    let err = engine.finish().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::LateInitialSet(_)));
}

#[test]
fn dummy_resolution_conflict_is_learned() {
    // Reading `p` forces a dummy resolution; the set for `p.x` only
    // surfaces later, revealed by `r`. One reset reorders the two.
    let engine = ExecutionEngine::new();

    let m1 = {
        let b = CodeBuilder::new("m1");
        let b = stmt_get(b, &["q"], 0, "v");
        let b = stmt_set(b, &["r"], 0, |b| b.op_const(Value::Integer(5)));
        let b = stmt_set(b, &["p", "x"], 0, |b| b.op_const(Value::Integer(7)));
        b.build()
    };
    let m2 = stmt_get(CodeBuilder::new("m2"), &["p"], 0, "u").build();

    engine.exec_code(m1).unwrap();
    engine.exec_code(m2).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(engine.resets(), 1);
    assert_eq!(values[&of(&["r"])], Value::Integer(5));
    assert_eq!(values[&of(&["p", "x"])], Value::Integer(7));
    // Both `q` and `p` were dummy-resolved.
    assert_eq!(values[&of(&["q"])], Value::None);
    assert_eq!(values[&of(&["p"])], Value::None);
}

#[test]
fn skip_scope_publishes_names_before_the_region_runs() {
    // Region (positions 5..45): x = $?(["in"], 0) + 1
    // The suspension splits only the region off; the set of `x` is
    // published as an extraction thunk and the code after the region
    // keeps executing immediately.
    let engine = ExecutionEngine::new();

    let m_use = {
        let b = CodeBuilder::new("use");
        let b = b.op(Op::SetSkip, pack_halves(45, 0));
        let b = b.call_named("$?", 2, |b| {
            b.push_name(&["in"]).op_const(Value::Integer(0))
        });
        let b = b.op_const(Value::Integer(1)).op_binop("+").op_set("x");
        assert_eq!(b.position(), 45);
        let b = b.op(Op::SetSkip, pack_halves(SKIP_SENTINEL, 0));
        let b = stmt_set(b, &["out"], 0, |b| b.op_get("x"));
        b.build()
    };
    let m_in = stmt_set(CodeBuilder::new("in"), &["in"], 0, |b| {
        b.op_const(Value::Integer(5))
    })
    .build();

    engine.exec_code(m_use).unwrap();
    engine.exec_code(m_in).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["in"])], Value::Integer(5));
    assert_eq!(values[&of(&["out"])], Value::Integer(6));
    assert_eq!(engine.resets(), 0);
}

#[test]
fn imports_resolve_through_module_thunks() {
    let engine = ExecutionEngine::new();
    engine.register_module("lib");

    // main: mod = import("lib"); $=(["res"], mod.answer, 0)
    let main = {
        let b = CodeBuilder::new("main");
        let b = b
            .call_named("import", 1, |b| b.op_const(Value::from("lib")))
            .op_set("mod");
        let b = b
            .call_named("$=", 3, |b| {
                b.push_name(&["res"])
                    .op_get("mod")
                    .op_const(Value::from("answer"))
                    .op(Op::GetAttr, 0)
                    .op_const(Value::Integer(0))
            })
            .op(Op::Drop, 1);
        b.build()
    };

    // lib: answer = 99
    let lib = CodeBuilder::new("lib")
        .op_const(Value::Integer(99))
        .op_set("answer")
        .build();

    // main executes first and suspends on the pending import.
    engine.exec_code(main).unwrap();
    engine.exec_code(lib).unwrap();

    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["res"])], Value::Integer(99));
}

#[test]
fn function_calls_bind_positionals_and_defaults() {
    let engine = ExecutionEngine::new();

    // body: return a + b
    let body = CodeBuilder::new("fn")
        .op_get("a")
        .op_get("b")
        .op_binop("+")
        .op(Op::Return, 0)
        .build();

    let function = Function {
        code: body,
        offset: 0,
        signature: Rc::new(Signature {
            names: vec!["a".into(), "b".into()],
            defaults: vec![Value::Integer(10)],
            flags: 0,
        }),
        env: EnvMap::default(),
    };

    let result = function
        .call(&engine, &[Value::Integer(1), Value::Integer(2)])
        .unwrap();
    assert_eq!(result, Value::Integer(3));

    let defaulted = function.call(&engine, &[Value::Integer(5)]).unwrap();
    assert_eq!(defaulted, Value::Integer(15));

    let too_few = function.call(&engine, &[]).unwrap_err();
    assert!(matches!(too_few.kind, ErrorKind::ValueError(_)));

    let too_many = function
        .call(
            &engine,
            &[Value::Integer(1), Value::Integer(2), Value::Integer(3)],
        )
        .unwrap_err();
    assert!(matches!(too_many.kind, ErrorKind::ValueError(_)));
}

#[test]
fn errors_carry_a_stack_trace_through_calls() {
    let engine = ExecutionEngine::new();

    // callee: return 1 // 0
    let callee_code = CodeBuilder::new("callee")
        .op_const(Value::Integer(1))
        .op_const(Value::Integer(0))
        .op_binop("//")
        .op(Op::Return, 0)
        .build();
    let callee = Value::Function(Rc::new(Function {
        code: callee_code,
        offset: 0,
        signature: Rc::new(Signature {
            names: vec![],
            defaults: vec![],
            flags: 0,
        }),
        env: EnvMap::default(),
    }));

    // caller: boom()
    let mut env = EnvMap::default();
    env.insert("boom".into(), callee);
    let caller = CodeBuilder::new("caller")
        .op_get("boom")
        .op(Op::Call, 0)
        .build();

    let err = Frame::new(caller, 0, env).execute(&engine).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ValueError(_)));
    let files: Vec<&str> = err.trace.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(files, vec!["callee.lzb", "caller.lzb"]);
}

#[test]
fn runspec_drives_modules_and_conclusion() {
    // A runspec with a pre-registered module and a conclusion unit,
    // assembled fully in memory.
    let engine = ExecutionEngine::new();

    let conclusion_code = stmt_set(CodeBuilder::new("conclusion"), &["done"], 0, |b| {
        b.op_const(Value::Integer(1))
    })
    .build();

    // Serialize the conclusion unit as header + body mappings.
    let mut conclusion = Vec::new();
    {
        use crate::value::Dict;
        use crate::wire::write_value;

        let mut header = Dict::new();
        header.insert(Value::from("name"), Value::from("conclusion")).unwrap();
        header.insert(Value::from("fname"), Value::from("conclusion.lzb")).unwrap();

        let mut body = Dict::new();
        body.insert(
            Value::from("code"),
            Value::Bytes(conclusion_code.code.clone()),
        )
        .unwrap();
        body.insert(
            Value::from("consts"),
            Value::List(Rc::new(conclusion_code.consts().to_vec())),
        )
        .unwrap();
        body.insert(Value::from("linenotab"), Value::Bytes(bytes::Bytes::new()))
            .unwrap();

        write_value(&mut conclusion, &Value::Dict(Rc::new(header))).unwrap();
        write_value(&mut conclusion, &Value::Dict(Rc::new(body))).unwrap();
    }

    let mut spec = crate::value::Dict::new();
    spec.insert(
        Value::from("modules"),
        Value::List(Rc::new(vec![Value::from("lib")])),
    )
    .unwrap();
    spec.insert(Value::from("files"), Value::List(Rc::new(vec![])))
        .unwrap();
    spec.insert(
        Value::from("conclusion"),
        Value::Bytes(bytes::Bytes::from(conclusion)),
    )
    .unwrap();

    engine.exec_runspec(&Value::Dict(Rc::new(spec))).unwrap();

    // The pre-registered module never loads, but nothing depends on
    // it; the conclusion's set still resolves.
    let values = engine.finish().unwrap();
    assert_eq!(values[&of(&["done"])], Value::Integer(1));
}

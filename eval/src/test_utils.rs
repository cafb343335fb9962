//! Test-only helpers for assembling code units by hand.
//!
//! The compiler is a separate program, so tests build their bytecode
//! through [`CodeBuilder`]: ops are appended with their 4-byte
//! arguments, constants are interned on first use, and `build`
//! produces the same immutable [`Code`] unit the loader would.

use std::rc::Rc;

use bytes::Bytes;

use crate::chunk::Code;
use crate::opcode::Op;
use crate::value::Value;

pub(crate) struct CodeBuilder {
    code: Vec<u8>,
    consts: Vec<Value>,
    modulename: String,
}

impl CodeBuilder {
    pub fn new(modulename: &str) -> Self {
        CodeBuilder {
            code: vec![],
            consts: vec![],
            modulename: modulename.to_string(),
        }
    }

    /// Current bytecode position; the next op lands here.
    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn op(mut self, op: Op, arg: u32) -> Self {
        self.code.push(op as u8);
        self.code.extend_from_slice(&arg.to_le_bytes());
        self
    }

    /// Intern a constant and return its pool index.
    pub fn intern(&mut self, value: Value) -> u32 {
        if let Some(idx) = self.consts.iter().position(|c| *c == value) {
            return idx as u32;
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u32
    }

    pub fn op_const(mut self, value: Value) -> Self {
        let idx = self.intern(value);
        self.op(Op::Const, idx)
    }

    pub fn op_get(mut self, name: &str) -> Self {
        let idx = self.intern(Value::from(name));
        self.op(Op::Get, idx)
    }

    pub fn op_set(mut self, name: &str) -> Self {
        let idx = self.intern(Value::from(name));
        self.op(Op::Set, idx)
    }

    pub fn op_binop(mut self, operator: &str) -> Self {
        let idx = self.intern(Value::from(operator));
        self.op(Op::BinOp, idx)
    }

    /// Emit a call of an engine/global binding: `GET name`, the
    /// argument ops produced by `args`, then `CALL n`.
    pub fn call_named(self, name: &str, argc: u32, args: impl FnOnce(Self) -> Self) -> Self {
        let with_callee = self.op_get(name);
        args(with_callee).op(Op::Call, argc)
    }

    /// Push a dollar name literal (`CONST` each segment, then
    /// `BUILDLIST`).
    pub fn push_name(mut self, segments: &[&str]) -> Self {
        let count = segments.len() as u32;
        for segment in segments {
            self = self.op_const(Value::from(*segment));
        }
        self.op(Op::BuildList, count)
    }

    pub fn build(self) -> Rc<Code> {
        Code::new(
            Bytes::from(self.code),
            self.consts,
            &format!("{}.lzb", self.modulename),
            &self.modulename,
            Bytes::new(),
        )
        .expect("builder emits well-formed instruction streams")
    }
}

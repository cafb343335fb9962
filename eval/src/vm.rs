//! The frame executor.
//!
//! A [`Frame`] is an immutable snapshot of execution state: a code
//! unit, the current position, an execution limit, an environment and
//! an operand stack. Executing a frame never mutates it; the executor
//! works on local copies and either runs to completion (returning the
//! final environment) or suspends.
//!
//! Suspension happens at exactly one point: when a thunk is about to
//! be pushed onto the operand stack. If a skip scope is armed, only
//! the armed region is split off into a continuation and the names it
//! defines are published as extraction thunks; otherwise the whole
//! remainder of the frame is deferred behind the incoming thunk and
//! its eventual `return` binding is exported. Either way the engine
//! later resumes the continuation by rebuilding a frame with the
//! delivered value pushed onto the saved stack.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::chunk::Code;
use crate::engine::ExecutionEngine;
use crate::errors::{ErrorKind, EvalResult};
use crate::opcode::{split_halves, Op, INSTRUCTION_WIDTH, NO_STAR, SKIP_SENTINEL};
use crate::value::{EnvMap, ThunkKind, Value};

#[derive(Debug)]
pub struct Frame {
    code: Rc<Code>,
    position: usize,
    limit: usize,
    env: EnvMap,
    stack: Vec<(u8, Value)>,
}

impl Frame {
    /// A frame over the whole remainder of `code`, starting at
    /// `offset` with an empty stack.
    pub fn new(code: Rc<Code>, offset: usize, env: EnvMap) -> Rc<Frame> {
        let limit = code.len();
        Frame::with_parts(code, offset, env, limit, vec![])
    }

    pub(crate) fn with_parts(
        code: Rc<Code>,
        position: usize,
        mut env: EnvMap,
        limit: usize,
        stack: Vec<(u8, Value)>,
    ) -> Rc<Frame> {
        env.insert("__code__".into(), Value::Code(code.clone()));
        Rc::new(Frame {
            code,
            position,
            limit,
            env,
            stack,
        })
    }

    pub fn code(&self) -> &Rc<Code> {
        &self.code
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn env(&self) -> &EnvMap {
        &self.env
    }

    /// The continuation frame for a delivered value: same snapshot,
    /// with the value pushed onto the saved stack.
    pub(crate) fn resumed_with(&self, value: Value) -> Rc<Frame> {
        let mut stack = self.stack.clone();
        stack.push((0, value));
        Frame::with_parts(
            self.code.clone(),
            self.position,
            self.env.clone(),
            self.limit,
            stack,
        )
    }

    /// Execute the frame against local copies of its state and return
    /// the resulting environment.
    pub fn execute(&self, engine: &ExecutionEngine) -> EvalResult<EnvMap> {
        engine.observe(|o| o.observe_enter_frame(self));

        let mut run = Run {
            code: self.code.clone(),
            stack: self.stack.clone(),
            env: self.env.clone(),
            position: self.position,
            limit: self.limit,
            // A resumed skip-region frame is re-armed at its own
            // limit, so a second suspension splits at the region end
            // again.
            skip: if self.limit < self.code.len() {
                Some((self.limit, 0))
            } else {
                None
            },
            halted: false,
        };

        while !run.halted && run.position < run.limit {
            let at = run.position;
            if let Err(err) = run.step(engine) {
                return Err(err.caught_at(
                    self.code.filename(),
                    self.code.lineno_for_position(at),
                ));
            }
        }

        engine.observe(|o| o.observe_exit_frame(self));
        Ok(run.env)
    }
}

/// Mutable execution state local to one `Frame::execute` call.
struct Run {
    code: Rc<Code>,
    stack: Vec<(u8, Value)>,
    env: EnvMap,
    position: usize,
    limit: usize,
    skip: Option<(usize, usize)>,
    halted: bool,
}

impl Run {
    fn step(&mut self, engine: &ExecutionEngine) -> EvalResult<()> {
        let (op, arg) = self.code.decode(self.position)?;
        engine.observe(|o| o.observe_execute_op(self.position, op, arg, self.stack.len()));
        self.position += INSTRUCTION_WIDTH;

        match op {
            Op::Kwarg => Err(ErrorKind::ReservedOpcode("KWARG").into()),

            Op::GetAttr => {
                let name = match self.pop()? {
                    Value::String(s) => SmolStr::from(&*s),
                    other => {
                        return Err(ErrorKind::TypeError(format!(
                            "Attribute name must be a string, not '{}'",
                            other.type_name()
                        ))
                        .into())
                    }
                };
                let receiver = self.pop()?;
                let value = receiver.getattr(engine, &name)?;
                self.push(engine, value)
            }

            Op::Call => {
                let argc = arg as usize;
                if self.stack.len() < argc + 1 {
                    return Err(underflow());
                }
                let split = self.stack.len() - argc;
                let args: Vec<Value> =
                    self.stack.split_off(split).into_iter().map(|(_, v)| v).collect();
                let callee = self.pop()?;
                let result = callee.call(engine, &args)?;
                self.push(engine, result)
            }

            Op::BinOp => {
                let op_name = self.const_string(arg)?;
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let result = binop(engine, &op_name, &lhs, &rhs)?;
                self.push(engine, result)
            }

            Op::Get => {
                let name = self.const_string(arg)?;
                let value = self.env.get(&name).cloned().ok_or_else(|| {
                    ErrorKind::NameError(format!("Name '{}' is not defined", name))
                })?;
                self.push(engine, value)
            }

            Op::Set => {
                let name = self.const_string(arg)?;
                let value = self.pop()?;
                self.env.insert(name, value);
                Ok(())
            }

            Op::Const => {
                let value = self.const_at(arg)?.clone();
                self.stack.push((0, value));
                Ok(())
            }

            Op::Jump => {
                self.position = arg as usize;
                Ok(())
            }

            Op::JumpIf => {
                if self.pop()?.to_bool() {
                    self.position = arg as usize;
                }
                Ok(())
            }

            Op::JumpIfNot => {
                if !self.pop()?.to_bool() {
                    self.position = arg as usize;
                }
                Ok(())
            }

            Op::JumpIfKeep => {
                if self.peek()?.to_bool() {
                    self.position = arg as usize;
                }
                Ok(())
            }

            Op::JumpIfNotKeep => {
                if !self.peek()?.to_bool() {
                    self.position = arg as usize;
                }
                Ok(())
            }

            Op::Drop => {
                for _ in 0..arg {
                    self.pop()?;
                }
                Ok(())
            }

            Op::Return => {
                let value = self.pop()?;
                self.env.insert("return".into(), value);
                self.halted = true;
                Ok(())
            }

            Op::GetEnv => {
                let snapshot = Value::Env(Rc::new(self.env.clone()));
                self.stack.push((0, snapshot));
                Ok(())
            }

            Op::SetSkip => {
                let (skip_position, save_stack) = split_halves(arg);
                self.skip = if skip_position == SKIP_SENTINEL {
                    None
                } else {
                    Some((skip_position as usize, save_stack as usize))
                };
                Ok(())
            }

            Op::Dup => {
                let value = self.peek()?.clone();
                for _ in 0..arg {
                    self.stack.push((0, value.clone()));
                }
                Ok(())
            }

            Op::Rot => {
                let item = self.stack.pop().ok_or_else(underflow)?;
                let depth = arg as usize;
                if depth > self.stack.len() {
                    return Err(underflow());
                }
                self.stack.insert(self.stack.len() - depth, item);
                Ok(())
            }

            Op::RRot => {
                let depth = arg as usize;
                if depth + 1 > self.stack.len() {
                    return Err(underflow());
                }
                let idx = self.stack.len() - 1 - depth;
                let (_, value) = self.stack.remove(idx);
                self.stack.push((0, value));
                Ok(())
            }

            Op::BuildList => {
                let argc = arg as usize;
                if self.stack.len() < argc {
                    return Err(underflow());
                }
                let split = self.stack.len() - argc;
                let items: Vec<Value> =
                    self.stack.split_off(split).into_iter().map(|(_, v)| v).collect();
                self.stack.push((0, Value::List(Rc::new(items))));
                Ok(())
            }

            Op::Unpack => self.unpack(arg),
        }
    }

    fn unpack(&mut self, arg: u32) -> EvalResult<()> {
        let value = self.pop()?;
        let items = match &value {
            Value::List(items) => items.clone(),
            other => {
                return Err(ErrorKind::TypeError(format!(
                    "Cannot unpack '{}'",
                    other.type_name()
                ))
                .into())
            }
        };

        let (count, star) = split_halves(arg);
        let count = count as usize;

        if star == NO_STAR {
            if items.len() != count {
                return Err(ErrorKind::ValueError(format!(
                    "Expected sequence of length '{}', got '{}'",
                    count,
                    items.len()
                ))
                .into());
            }
            for item in items.iter() {
                self.stack.push((0, item.clone()));
            }
            return Ok(());
        }

        let star = star as usize;
        if star >= count {
            return Err(ErrorKind::MalformedBytecode(format!(
                "UNPACK star index {} out of range for count {}",
                star, count
            ))
            .into());
        }
        if items.len() + 1 < count {
            return Err(ErrorKind::ValueError(format!(
                "Expected sequence of length '{}' or greater, got '{}'",
                count - 1,
                items.len()
            ))
            .into());
        }

        let middle_len = items.len() - (count - 1);
        let mut idx = 0;
        for i in 0..count {
            if i == star {
                let segment = items[idx..idx + middle_len].to_vec();
                self.stack.push((0, Value::List(Rc::new(segment))));
                idx += middle_len;
            } else {
                self.stack.push((0, items[idx].clone()));
                idx += 1;
            }
        }
        Ok(())
    }

    /// Push a value produced by an instruction. Thunks trigger the
    /// suspension protocol instead of landing on the stack.
    fn push(&mut self, engine: &ExecutionEngine, value: Value) -> EvalResult<()> {
        let thunk = match value {
            Value::Thunk(thunk) => thunk,
            concrete => {
                self.stack.push((0, concrete));
                return Ok(());
            }
        };

        match self.skip {
            Some((skip_position, save_stack)) => {
                let save = save_stack.min(self.stack.len());
                let sub_stack = self.stack.split_off(save);
                let subframe = Frame::with_parts(
                    self.code.clone(),
                    self.position,
                    self.env.clone(),
                    skip_position,
                    sub_stack,
                );
                let exec = engine.make_thunk(ThunkKind::Execution { frame: subframe });
                engine.subscribe_thunk(&thunk, &exec);
                engine.observe(|o| o.observe_suspend_frame(self.position, &thunk));

                // Within an armed region no control transfer leaves
                // the region and the only environment effects are
                // plain SETs, so a linear scan finds every exported
                // name. Each one becomes an extraction thunk over the
                // region's eventual result.
                let end = skip_position.min(self.code.len());
                let mut scan = self.position;
                while scan + INSTRUCTION_WIDTH <= end {
                    if self.code.op_byte(scan) == Op::Set as u8 {
                        let (_, set_arg) = self.code.decode(scan)?;
                        let name = self.const_string(set_arg)?;
                        let extract =
                            engine.make_thunk(ThunkKind::NameExtract { name: name.clone() });
                        engine.subscribe_thunk(&exec, &extract);
                        self.env.insert(name, Value::Thunk(extract));
                    }
                    scan += INSTRUCTION_WIDTH;
                }

                self.position = skip_position;
                Ok(())
            }

            None => {
                let subframe = Frame::with_parts(
                    self.code.clone(),
                    self.position,
                    self.env.clone(),
                    self.code.len(),
                    self.stack.clone(),
                );
                let exec = engine.make_thunk(ThunkKind::Execution { frame: subframe });
                let extract = engine.make_thunk(ThunkKind::NameExtract {
                    name: "return".into(),
                });
                engine.subscribe_thunk(&exec, &extract);
                engine.subscribe_thunk(&thunk, &exec);
                engine.observe(|o| o.observe_suspend_frame(self.position, &thunk));
                self.env.insert("return".into(), Value::Thunk(extract));
                self.halted = true;
                Ok(())
            }
        }
    }

    fn pop(&mut self) -> EvalResult<Value> {
        self.stack
            .pop()
            .map(|(_, value)| value)
            .ok_or_else(underflow)
    }

    fn peek(&self) -> EvalResult<&Value> {
        self.stack
            .last()
            .map(|(_, value)| value)
            .ok_or_else(underflow)
    }

    fn const_at(&self, idx: u32) -> EvalResult<&Value> {
        self.code.consts.get(idx as usize).ok_or_else(|| {
            ErrorKind::MalformedBytecode(format!("constant index {} out of range", idx)).into()
        })
    }

    fn const_string(&self, idx: u32) -> EvalResult<SmolStr> {
        match self.const_at(idx)? {
            Value::String(s) => Ok(SmolStr::from(&**s)),
            other => Err(ErrorKind::TypeError(format!(
                "Name must be a string, not '{}'",
                other.type_name()
            ))
            .into()),
        }
    }
}

fn underflow() -> crate::errors::Error {
    ErrorKind::MalformedBytecode("operand stack underflow".into()).into()
}

/// Binary-operator dispatch: left operand first, reflected operator
/// on the right as a fallback, and only `UnsupportedOperation`
/// triggers (or cancels) the fallback.
pub(crate) fn binop(
    engine: &ExecutionEngine,
    op: &str,
    lhs: &Value,
    rhs: &Value,
) -> EvalResult<Value> {
    let method = lhs.get_method(engine, op)?;
    match method.call(engine, &[rhs.clone()]) {
        Ok(value) => Ok(value),
        Err(original) if original.kind.is_unsupported_operation() => {
            let reflected = format!("r{}", op);
            let method = rhs.get_method(engine, &reflected)?;
            match method.call(engine, &[lhs.clone()]) {
                Ok(value) => Ok(value),
                Err(err) if err.kind.is_unsupported_operation() => Err(original),
                Err(err) => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

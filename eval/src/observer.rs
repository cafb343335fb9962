//! Implements a trait for things that wish to observe internal state
//! changes of the interpreter.
//!
//! This is how tracing works: the engine and the frame executor
//! report what they are doing through an observer, and the CLI's
//! `--debug` flag swaps the silent default for one that writes an
//! aligned event log.

use std::io::Write;
use std::rc::Rc;

use tabwriter::TabWriter;

use crate::chunk::Code;
use crate::engine::DollarName;
use crate::opcode::Op;
use crate::value::{Thunk, Value};
use crate::vm::Frame;

/// Implemented by types that wish to observe internal happenings of
/// the interpreter.
///
/// All methods are optional; observers implement only what they are
/// interested in.
pub trait RuntimeObserver {
    /// Called when a code unit is about to be executed.
    fn observe_code_loaded(&mut self, _code: &Rc<Code>) {}

    /// Called when a frame starts executing.
    fn observe_enter_frame(&mut self, _frame: &Frame) {}

    /// Called when a frame has run to completion.
    fn observe_exit_frame(&mut self, _frame: &Frame) {}

    /// Called when a frame suspends on a thunk.
    fn observe_suspend_frame(&mut self, _position: usize, _thunk: &Thunk) {}

    /// Called before each instruction is executed.
    fn observe_execute_op(&mut self, _position: usize, _op: Op, _arg: u32, _stack_depth: usize) {
    }

    /// Called when the engine starts resolving a dollar name.
    fn observe_resolve(&mut self, _name: &DollarName) {}

    /// Called when a name is committed without any set.
    fn observe_dummy_resolve(&mut self, _name: &DollarName) {}

    /// Called when a late set for `name` is attributed to the
    /// resolution of `revealed_by`.
    fn observe_conflict(&mut self, _name: &DollarName, _revealed_by: &DollarName) {}

    /// Called after the engine restored its state snapshot.
    fn observe_reset(&mut self, _resets: u32) {}

    /// Called when a thunk is delivered its value.
    fn observe_finalize(&mut self, _thunk: &Thunk, _value: &Value) {}
}

#[derive(Default)]
pub struct NoOpObserver {}

impl RuntimeObserver for NoOpObserver {}

/// An observer that writes an event log of VM execution and engine
/// resolution to its internal writer.
pub struct TracingObserver<W: Write> {
    writer: TabWriter<W>,
}

impl<W: Write> TracingObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: TabWriter::new(writer),
        }
    }
}

impl<W: Write> RuntimeObserver for TracingObserver<W> {
    fn observe_code_loaded(&mut self, code: &Rc<Code>) {
        let _ = code.disassemble(&mut self.writer);
        let _ = self.writer.flush();
    }

    fn observe_enter_frame(&mut self, frame: &Frame) {
        let _ = writeln!(
            &mut self.writer,
            "=== begin exec\t{}-{} ===",
            frame.position(),
            frame.limit()
        );
    }

    fn observe_exit_frame(&mut self, frame: &Frame) {
        let _ = writeln!(
            &mut self.writer,
            "=== end exec\t{}-{} ===",
            frame.position(),
            frame.limit()
        );
        let _ = self.writer.flush();
    }

    fn observe_suspend_frame(&mut self, position: usize, thunk: &Thunk) {
        let _ = writeln!(&mut self.writer, "=== suspend at {}\ton {} ===", position, thunk);
        let _ = self.writer.flush();
    }

    fn observe_execute_op(&mut self, position: usize, op: Op, arg: u32, stack_depth: usize) {
        let _ = writeln!(
            &mut self.writer,
            "{:04}\t{}\t{}\tstack: {}",
            position, op, arg, stack_depth
        );
    }

    fn observe_resolve(&mut self, name: &DollarName) {
        let _ = writeln!(&mut self.writer, "$resolve\t{}", name);
        let _ = self.writer.flush();
    }

    fn observe_dummy_resolve(&mut self, name: &DollarName) {
        let _ = writeln!(&mut self.writer, "$dummy\t{}", name);
        let _ = self.writer.flush();
    }

    fn observe_conflict(&mut self, name: &DollarName, revealed_by: &DollarName) {
        let _ = writeln!(
            &mut self.writer,
            "$conflict\t{}\trevealed by {}",
            name, revealed_by
        );
        let _ = self.writer.flush();
    }

    fn observe_reset(&mut self, resets: u32) {
        let _ = writeln!(&mut self.writer, "$reset\t#{}", resets);
        let _ = self.writer.flush();
    }

    fn observe_finalize(&mut self, thunk: &Thunk, value: &Value) {
        let _ = writeln!(&mut self.writer, "finalize\t{}\t= {}", thunk, value);
    }
}

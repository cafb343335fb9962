//! Compiled code units.
//!
//! A [`Code`] object is the immutable result of compilation: an
//! instruction stream, a constants pool, the source filename, the
//! module name and a compact line-number table. Code objects arrive
//! as two serialized mappings back to back (a header and a body, see
//! the wire module) and are shared by reference between frames,
//! functions and thunks.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::rc::Rc;

use bytes::Bytes;
use smol_str::SmolStr;

use crate::errors::{ErrorKind, EvalResult};
use crate::opcode::{split_halves, Op, INSTRUCTION_WIDTH};
use crate::value::{Dict, Value};
use crate::wire;

pub struct Code {
    pub(crate) code: Bytes,
    pub(crate) consts: Vec<Value>,
    fname: SmolStr,
    modulename: SmolStr,
    linenotab: Bytes,
}

impl std::fmt::Debug for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Code({}, {} ops, {} consts)",
            self.modulename,
            self.code.len() / INSTRUCTION_WIDTH,
            self.consts.len()
        )
    }
}

impl Code {
    pub fn new(
        code: Bytes,
        consts: Vec<Value>,
        fname: &str,
        modulename: &str,
        linenotab: Bytes,
    ) -> EvalResult<Rc<Code>> {
        if code.len() % INSTRUCTION_WIDTH != 0 {
            return Err(ErrorKind::MalformedBytecode(format!(
                "instruction stream length {} is not a multiple of {}",
                code.len(),
                INSTRUCTION_WIDTH
            ))
            .into());
        }

        Ok(Rc::new(Code {
            code,
            consts,
            fname: fname.into(),
            modulename: modulename.into(),
            linenotab,
        }))
    }

    pub fn from_file(path: &Path) -> EvalResult<Rc<Code>> {
        let file = File::open(path).map_err(|error| ErrorKind::Io {
            path: Some(path.to_path_buf()),
            error: Rc::new(error),
        })?;
        Code::from_reader(&mut BufReader::new(file))
    }

    /// Read a code unit from a reader positioned at its header
    /// mapping.
    pub fn from_reader<R: Read>(r: &mut R) -> EvalResult<Rc<Code>> {
        let header = wire::read_value(r)?;
        let body = wire::read_value(r)?;
        Code::from_parts(&header, &body)
    }

    fn from_parts(header: &Value, body: &Value) -> EvalResult<Rc<Code>> {
        let header = header.as_dict()?;
        let body = body.as_dict()?;

        let field = |dict: &Dict, key: &str| -> EvalResult<Value> {
            dict.get_str(key).cloned().ok_or_else(|| {
                ErrorKind::MalformedBytecode(format!("missing field '{}'", key)).into()
            })
        };

        let fname = field(header, "fname")?;
        let modulename = field(header, "name")?;
        let code = field(body, "code")?;
        let consts = field(body, "consts")?;
        let linenotab = field(body, "linenotab")?;

        Code::new(
            code.as_bytes()?.clone(),
            consts.as_list()?.as_ref().clone(),
            fname.as_str()?,
            modulename.as_str()?,
            linenotab.as_bytes()?.clone(),
        )
    }

    /// Length of the instruction stream in bytes.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn filename(&self) -> &str {
        &self.fname
    }

    pub fn modulename(&self) -> &str {
        &self.modulename
    }

    pub fn consts(&self) -> &[Value] {
        &self.consts
    }

    /// Decode the instruction at `position`.
    pub fn decode(&self, position: usize) -> EvalResult<(Op, u32)> {
        if position + INSTRUCTION_WIDTH > self.code.len() {
            return Err(ErrorKind::MalformedBytecode(format!(
                "truncated instruction at position {}",
                position
            ))
            .into());
        }

        let byte = self.code[position];
        let op = Op::from_byte(byte).ok_or(ErrorKind::UnknownOpcode(byte))?;
        let arg = u32::from_le_bytes(
            self.code[position + 1..position + INSTRUCTION_WIDTH]
                .try_into()
                .expect("slice length is statically four"),
        );
        Ok((op, arg))
    }

    /// Raw opcode byte at `position`, for scans that must not fail on
    /// unknown bytes.
    pub(crate) fn op_byte(&self, position: usize) -> u8 {
        self.code[position]
    }

    /// Locate the source line for a bytecode position by walking the
    /// `(bytecode_delta, line_delta)` pairs of the line table.
    pub fn lineno_for_position(&self, position: usize) -> u32 {
        let mut lineno: i64 = 0;
        let mut bcode_pos: usize = 0;
        let mut iter = self.linenotab.iter();

        while let (Some(&bdelta), Some(&ldelta)) = (iter.next(), iter.next()) {
            if position < bcode_pos + bdelta as usize {
                break;
            }
            bcode_pos += bdelta as usize;
            lineno += (ldelta as i8) as i64;
        }

        lineno.max(0) as u32
    }

    /// Write a human-readable listing of the constants pool and the
    /// instruction stream.
    pub fn disassemble<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "Compiled from {} ({})", self.fname, self.modulename)?;
        writeln!(w, "Consts:")?;
        for (i, value) in self.consts.iter().enumerate() {
            writeln!(w, "  {}: {}", i, value)?;
        }

        writeln!(w, "Code:")?;
        let mut position = 0;
        while position < self.code.len() {
            match self.decode(position) {
                Ok((op, arg)) => {
                    write!(w, "  {}: {}", position, op)?;
                    match op {
                        Op::SetSkip | Op::Unpack => {
                            let (low, high) = split_halves(arg);
                            writeln!(w, " {} {}", low, high)?;
                        }
                        op if op.arg_is_constant() => {
                            match self.consts.get(arg as usize) {
                                Some(c) => writeln!(w, " {} ({})", arg, c)?,
                                None => writeln!(w, " {} (?)", arg)?,
                            }
                        }
                        _ => writeln!(w, " {}", arg)?,
                    }
                }
                Err(_) => {
                    writeln!(w, "  {}: UNKNOWN {:#04x}", position, self.code[position])?;
                }
            }
            position += INSTRUCTION_WIDTH;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::pack_halves;
    use crate::test_utils::CodeBuilder;

    #[test]
    fn rejects_ragged_instruction_stream() {
        let err = Code::new(
            Bytes::from_static(&[6, 0, 0]),
            vec![],
            "t.lz",
            "t",
            Bytes::new(),
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MalformedBytecode(_)));
    }

    #[test]
    fn decode_round_trips_through_builder() {
        let code = CodeBuilder::new("t")
            .op_const(Value::Integer(42))
            .op(Op::Return, 0)
            .build();

        assert_eq!(code.decode(0).unwrap(), (Op::Const, 0));
        assert_eq!(code.decode(5).unwrap(), (Op::Return, 0));
    }

    #[test]
    fn unknown_opcode_is_reported() {
        let code = Code::new(
            Bytes::from_static(&[99, 0, 0, 0, 0]),
            vec![],
            "t.lz",
            "t",
            Bytes::new(),
        )
        .unwrap();
        let err = code.decode(0).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownOpcode(99)));
    }

    #[test]
    fn line_table_walk() {
        // Three entries: positions 0..10 are line 1, 10..25 line 3,
        // 25.. line 4.
        let tab = Bytes::from_static(&[0, 1, 10, 2, 15, 1]);
        let code = Code::new(Bytes::new(), vec![], "t.lz", "t", tab).unwrap();

        assert_eq!(code.lineno_for_position(0), 1);
        assert_eq!(code.lineno_for_position(9), 1);
        assert_eq!(code.lineno_for_position(10), 3);
        assert_eq!(code.lineno_for_position(24), 3);
        assert_eq!(code.lineno_for_position(25), 4);
        assert_eq!(code.lineno_for_position(500), 4);
    }

    #[test]
    fn negative_line_deltas_are_honoured() {
        let tab = Bytes::from_static(&[0, 5, 5, 0xFE]); // -2 as u8
        let code = Code::new(Bytes::new(), vec![], "t.lz", "t", tab).unwrap();
        assert_eq!(code.lineno_for_position(0), 5);
        assert_eq!(code.lineno_for_position(5), 3);
    }

    #[test]
    fn disassembly_mentions_constants() {
        let code = CodeBuilder::new("t")
            .op_const(Value::from("hello"))
            .op(Op::SetSkip, pack_halves(20, 1))
            .build();

        let mut out = Vec::new();
        code.disassemble(&mut out).unwrap();
        let listing = String::from_utf8(out).unwrap();
        assert!(listing.contains("CONST 0 (hello)"));
        assert!(listing.contains("SETSKIP 20 1"));
    }
}

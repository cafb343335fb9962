//! The self-describing serialization format shared with the compiler.
//!
//! Every value is a single tag byte followed by a little-endian
//! payload. Bytecode files consist of two values back to back (a
//! header mapping and a body mapping), runspecs are a single mapping,
//! and the engine's final dollar-value map is emitted as a `DICT`
//! between two marker lines.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::rc::Rc;

use bytes::Bytes;
use thiserror::Error;

use crate::engine::DollarName;
use crate::value::{Dict, Value};

const TAG_INT: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_DICT: u8 = 3;
const TAG_SET: u8 = 4;
const TAG_LIST: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_TRUE: u8 = 7;
const TAG_FALSE: u8 = 8;
const TAG_NONE: u8 = 9;

/// Line emitted before the serialized result map.
pub const MARKER: &str = "=== MARKER ===";

/// Line emitted after the serialized result map.
pub const END_MARKER: &str = "=== END MARKER ===";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown tag {0:#04x}")]
    UnknownTag(u8),

    #[error("tag {0:#04x} is reserved")]
    ReservedTag(u8),

    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("integer {0} does not fit the 4-byte wire encoding")]
    IntOutOfRange(i64),

    #[error("values of type '{0}' are not representable")]
    Unrepresentable(&'static str),

    #[error("mapping key of type '{0}' is not hashable")]
    UnhashableKey(&'static str),

    #[error("I/O while (de)serializing: {0}")]
    Io(String),
}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        WireError::Io(err.to_string())
    }
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> Result<[u8; N], WireError> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_len<R: Read>(r: &mut R) -> Result<usize, WireError> {
    Ok(u32::from_le_bytes(read_array(r)?) as usize)
}

/// Deserialize a single value from a reader. The reader is left
/// positioned directly behind the value, so consecutive values can be
/// read back to back.
pub fn read_value<R: Read>(r: &mut R) -> Result<Value, WireError> {
    let tag = read_array::<R, 1>(r)?[0];
    match tag {
        TAG_INT => {
            let n = i32::from_le_bytes(read_array(r)?);
            Ok(Value::Integer(n as i64))
        }

        TAG_FLOAT => Ok(Value::Float(f64::from_le_bytes(read_array(r)?))),

        TAG_STRING => {
            let len = read_len(r)?;
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            let s = String::from_utf8(buf).map_err(|_| WireError::InvalidUtf8)?;
            Ok(Value::String(Rc::from(s.as_str())))
        }

        TAG_DICT => {
            let len = read_len(r)?;
            let mut dict = Dict::new();
            for _ in 0..len {
                let key = read_value(r)?;
                let value = read_value(r)?;
                dict.insert(key, value)
                    .map_err(|unhashable| WireError::UnhashableKey(unhashable))?;
            }
            Ok(Value::Dict(Rc::new(dict)))
        }

        TAG_LIST => {
            let len = read_len(r)?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(read_value(r)?);
            }
            Ok(Value::List(Rc::new(items)))
        }

        TAG_BYTES => {
            let len = read_len(r)?;
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            Ok(Value::Bytes(Bytes::from(buf)))
        }

        TAG_TRUE => Ok(Value::Bool(true)),
        TAG_FALSE => Ok(Value::Bool(false)),
        TAG_NONE => Ok(Value::None),

        TAG_SET => Err(WireError::ReservedTag(tag)),
        other => Err(WireError::UnknownTag(other)),
    }
}

fn write_len<W: Write>(w: &mut W, len: usize) -> Result<(), WireError> {
    w.write_all(&(len as u32).to_le_bytes())?;
    Ok(())
}

/// Serialize a single value. Only the wire-representable subset of
/// the value universe is accepted.
pub fn write_value<W: Write>(w: &mut W, value: &Value) -> Result<(), WireError> {
    match value {
        Value::Integer(n) => {
            let narrow =
                i32::try_from(*n).map_err(|_| WireError::IntOutOfRange(*n))?;
            w.write_all(&[TAG_INT])?;
            w.write_all(&narrow.to_le_bytes())?;
        }

        Value::Float(x) => {
            w.write_all(&[TAG_FLOAT])?;
            w.write_all(&x.to_le_bytes())?;
        }

        Value::String(s) => {
            w.write_all(&[TAG_STRING])?;
            write_len(w, s.len())?;
            w.write_all(s.as_bytes())?;
        }

        Value::Dict(dict) => {
            w.write_all(&[TAG_DICT])?;
            write_len(w, dict.len())?;
            for (key, val) in dict.iter() {
                write_value(w, key)?;
                write_value(w, val)?;
            }
        }

        Value::List(items) => {
            w.write_all(&[TAG_LIST])?;
            write_len(w, items.len())?;
            for item in items.iter() {
                write_value(w, item)?;
            }
        }

        Value::Bytes(b) => {
            w.write_all(&[TAG_BYTES])?;
            write_len(w, b.len())?;
            w.write_all(b)?;
        }

        Value::Bool(true) => w.write_all(&[TAG_TRUE])?,
        Value::Bool(false) => w.write_all(&[TAG_FALSE])?,
        Value::None => w.write_all(&[TAG_NONE])?,

        other => return Err(WireError::Unrepresentable(other.type_name())),
    }

    Ok(())
}

/// Emit the final dollar-value map between the marker lines, with
/// dotted names as string keys.
pub fn write_results<W: Write>(
    w: &mut W,
    values: &BTreeMap<DollarName, Value>,
) -> Result<(), WireError> {
    writeln!(w, "{}", MARKER)?;

    let mut dict = Dict::new();
    for (name, value) in values {
        dict.insert(Value::from(name.to_string().as_str()), value.clone())
            .map_err(WireError::UnhashableKey)?;
    }
    write_value(w, &Value::Dict(Rc::new(dict)))?;

    writeln!(w)?;
    writeln!(w, "{}", END_MARKER)?;
    Ok(())
}

//! Error types shared between the frame executor and the execution
//! engine.
//!
//! There are two orthogonal kinds of failure, both carried by
//! [`ErrorKind`]: errors raised *by* executing programs (the
//! `TypeError`/`NameError`/… taxonomy, which the binary-operator
//! dispatcher partially intercepts) and host errors (malformed
//! bytecode, I/O problems, violated engine invariants). Either kind
//! travels out of the interpreter as an [`Error`], which accumulates a
//! stack trace of `(filename, line)` fragments while it unwinds
//! through frame boundaries.

use std::error;
use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::wire::WireError;

pub type EvalResult<T> = Result<T, Error>;

#[derive(Clone, Debug)]
pub enum ErrorKind {
    // Raised by executing programs.
    TypeError(String),

    /// Subtype of `TypeError`; the only error kind the reflected
    /// binary-operator fallback reacts to.
    UnsupportedOperation(String),

    NameError(String),
    IndexError(String),
    ValueError(String),
    AssertionError(String),

    // Host errors.
    /// An opcode byte with no assigned instruction.
    UnknownOpcode(u8),

    /// A reserved opcode reached the executor.
    ReservedOpcode(&'static str),

    /// Structurally invalid bytecode (truncated instruction stream,
    /// missing header fields, operand stack underflow, ...).
    MalformedBytecode(String),

    /// Errors from the serialization codec.
    Wire(WireError),

    /// I/O errors while loading bytecode or runspecs.
    Io {
        path: Option<PathBuf>,
        error: Rc<io::Error>,
    },

    /// The C3 linearization of a type's bases does not exist.
    MroConflict(String),

    /// More than one non-default initial set for a dollar name.
    DuplicateInitialSet(String),

    /// A plain set arrived for a name that is already being resolved.
    LateInitialSet(String),

    /// A dollar name transitively requires itself to be resolved
    /// first.
    CircularDependency(String),

    /// No dollar name can be picked and no dummy resolution applies.
    Deadlock(String),

    /// `import` of a module that is neither loaded nor pre-registered.
    UnknownModule(String),

    /// A runspec value with the wrong shape.
    BadRunspec(String),
}

impl ErrorKind {
    /// Whether this is the `UnsupportedOperation` kind that triggers
    /// the reflected-operator fallback.
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self, ErrorKind::UnsupportedOperation(_))
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError(msg) => write!(f, "TypeError: {}", msg),
            ErrorKind::UnsupportedOperation(msg) => {
                write!(f, "UnsupportedOperation: {}", msg)
            }
            ErrorKind::NameError(msg) => write!(f, "NameError: {}", msg),
            ErrorKind::IndexError(msg) => write!(f, "IndexError: {}", msg),
            ErrorKind::ValueError(msg) => write!(f, "ValueError: {}", msg),
            ErrorKind::AssertionError(msg) => write!(f, "AssertionError: {}", msg),

            ErrorKind::UnknownOpcode(byte) => {
                write!(f, "unknown opcode {:#04x}", byte)
            }
            ErrorKind::ReservedOpcode(name) => {
                write!(f, "reserved opcode {} is not executable", name)
            }
            ErrorKind::MalformedBytecode(msg) => {
                write!(f, "malformed bytecode: {}", msg)
            }
            ErrorKind::Wire(err) => write!(f, "wire format error: {}", err),
            ErrorKind::Io { path, error } => match path {
                Some(path) => write!(f, "I/O error on {}: {}", path.display(), error),
                None => write!(f, "I/O error: {}", error),
            },
            ErrorKind::MroConflict(msg) => {
                write!(f, "cannot linearize type hierarchy: {}", msg)
            }
            ErrorKind::DuplicateInitialSet(name) => {
                write!(f, "multiple non-default initial sets for '{}'", name)
            }
            ErrorKind::LateInitialSet(name) => {
                write!(f, "non-modification set for '{}' after its initial set", name)
            }
            ErrorKind::CircularDependency(name) => {
                write!(f, "circular dependency while resolving '{}'", name)
            }
            ErrorKind::Deadlock(msg) => {
                write!(f, "cannot find next dollar name: {}", msg)
            }
            ErrorKind::UnknownModule(name) => write!(f, "unknown module '{}'", name),
            ErrorKind::BadRunspec(msg) => write!(f, "bad runspec: {}", msg),
        }
    }
}

impl From<WireError> for ErrorKind {
    fn from(err: WireError) -> Self {
        ErrorKind::Wire(err)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io {
            path: None,
            error: Rc::new(err),
        }
    }
}

/// One frame of an error's stack trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceFrame {
    pub filename: SmolStr,
    pub line: u32,
}

#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,

    /// Trace fragments in the order they were appended, i.e. from the
    /// innermost frame outwards.
    pub trace: Vec<TraceFrame>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind, trace: vec![] }
    }

    /// Append a `(filename, line)` fragment for a frame the error
    /// passed through.
    pub fn caught_at(mut self, filename: &str, line: u32) -> Self {
        self.trace.push(TraceFrame {
            filename: filename.into(),
            line,
        });
        self
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<WireError> for Error {
    fn from(err: WireError) -> Self {
        Error::new(err.into())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.trace.is_empty() {
            writeln!(f, "Traceback (most recent call last):")?;
            // The trace is recorded innermost-first; print it the
            // other way around.
            for frame in self.trace.iter().rev() {
                writeln!(f, "  File \"{}\", line {}", frame.filename, frame.line)?;
            }
        }
        self.kind.fmt(f)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Wire(err) => Some(err),
            ErrorKind::Io { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

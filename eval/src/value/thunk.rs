//! Runtime representation of thunks.
//!
//! A thunk is a first-class placeholder for a value that is not yet
//! known. Thunks are created by the execution engine (dollar reads and
//! writes, child enumeration, pending imports) and by the frame
//! executor when it suspends (continuations and name extraction).
//! Every thunk belongs to exactly one engine, is delivered exactly one
//! value through [`crate::ExecutionEngine::finalize_thunk`], and is
//! afterwards released once its subscribers have been notified.
//!
//! The payload behind a thunk is immutable; sharing a thunk between a
//! pending map, a subscriber list and a state snapshot is therefore
//! safe, which is what makes engine rollback a plain map restore.

use std::cell::Cell;
use std::fmt::{self, Display};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::engine::DollarName;
use crate::vm::Frame;

use super::Value;

#[derive(Clone, Debug)]
pub struct Thunk(Rc<ThunkInner>);

#[derive(Debug)]
struct ThunkInner {
    /// Engine-unique identity, used to key subscriber lists.
    id: u64,
    kind: ThunkKind,
    finalized: Cell<bool>,
}

#[derive(Debug)]
pub enum ThunkKind {
    /// User-visible barrier, finalized with `1` once the engine is
    /// otherwise quiescent.
    Test { name: SmolStr },

    /// Pending read of a dollar name.
    Get { name: DollarName, flags: u32 },

    /// Pending write of a dollar name.
    Set {
        name: DollarName,
        value: Value,
        flags: u32,
    },

    /// One element of the lazy child-name sequence of `name`.
    Sub { name: DollarName, position: usize },

    /// A suspended frame, resumed with the producing thunk's value
    /// pushed onto its stack.
    Execution { frame: Rc<Frame> },

    /// Projects a single binding out of an execution result.
    NameExtract { name: SmolStr },

    /// A module that has not finished executing yet.
    Module { name: SmolStr },
}

impl Thunk {
    pub(crate) fn new(id: u64, kind: ThunkKind) -> Self {
        Thunk(Rc::new(ThunkInner {
            id,
            kind,
            finalized: Cell::new(false),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> &ThunkKind {
        &self.0.kind
    }

    pub fn is_finalized(&self) -> bool {
        self.0.finalized.get()
    }

    pub(crate) fn mark_finalized(&self) {
        self.0.finalized.set(true);
    }

    /// Identity comparison; thunks are equal only to themselves.
    pub fn ptr_eq(&self, other: &Thunk) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Display for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ThunkKind::Test { name } => write!(f, "TT({})", name),
            ThunkKind::Get { name, flags } => write!(f, "GT({}@{})", name, flags),
            ThunkKind::Set { name, value, flags } => {
                write!(f, "ST({}={} @{})", name, value, flags)
            }
            ThunkKind::Sub { name, position } => write!(f, "SubT({}@{})", name, position),
            ThunkKind::Execution { frame } => {
                write!(f, "ET({}-{})", frame.position(), frame.limit())
            }
            ThunkKind::NameExtract { name } => write!(f, "NT({})", name),
            ThunkKind::Module { name } => write!(f, "MT({})", name),
        }
    }
}

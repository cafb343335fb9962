//! Per-attempt engine state.
//!
//! Everything in [`ExecutionState`] is discarded on rollback: the
//! engine snapshots the whole struct at the top of `finish()` and
//! restores the snapshot when a conflict is found. The snapshot is a
//! plain `clone()`; pending lists are independent copies, while the
//! thunks and values inside them are immutable and safely shared with
//! the snapshot.

use std::collections::{BTreeMap, BTreeSet};

use smol_str::SmolStr;

use crate::value::{Thunk, Value};

use super::DollarName;

#[derive(Clone, Default)]
pub(crate) struct ExecutionState {
    /// Deferred barriers, finalized with `1` once the engine is
    /// quiescent.
    pub test_thunks: Vec<Thunk>,

    /// Producer thunk id → subscribers awaiting its value.
    pub subscriptions: BTreeMap<u64, Vec<Thunk>>,

    /// Finalized thunks whose values have not been delivered yet.
    pub results: Vec<(Thunk, Value)>,

    /// Pending reads, writes and child enumerations per dollar name.
    pub get_thunks: BTreeMap<DollarName, Vec<Thunk>>,
    pub set_thunks: BTreeMap<DollarName, Vec<Thunk>>,
    pub sub_thunks: BTreeMap<DollarName, Vec<Thunk>>,

    /// Child segments discovered so far, in discovery order.
    /// Positions are stable within an attempt.
    pub sub_names: BTreeMap<DollarName, Vec<SmolStr>>,

    /// Committed values for this attempt.
    pub dollar_values: BTreeMap<DollarName, Value>,

    /// Names committed without any set (empty value), tracked so a
    /// late real set can be recognized as a conflict.
    pub dummy_resolved: BTreeSet<DollarName>,

    /// Resolution sequence of this attempt, used to attribute
    /// conflicts.
    pub resolution_order: Vec<DollarName>,

    /// Alias name → canonical target.
    pub aliases: BTreeMap<DollarName, DollarName>,
}

impl ExecutionState {
    /// Whether any resolution-driving work is pending.
    pub fn has_pending_work(&self) -> bool {
        !self.results.is_empty()
            || !self.get_thunks.is_empty()
            || !self.set_thunks.is_empty()
            || !self.sub_thunks.is_empty()
    }
}

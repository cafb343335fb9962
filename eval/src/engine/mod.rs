//! The execution engine.
//!
//! The engine owns all unresolved thunks and the dollar-name state,
//! and drives resolution to quiescence. Frames run until they suspend
//! or complete; suspension hands the engine a continuation subscribed
//! to the thunk it is waiting for. The engine repeatedly picks a
//! dollar name whose pending sets can fire, applies them, delivers
//! results to subscribers, and checks that nothing it learned
//! contradicts an earlier commitment.
//!
//! Ordering between dollar names is discovered by observation: when a
//! set for an already-committed name surfaces late, the engine
//! records which resolution revealed it, rolls the per-attempt state
//! back to the snapshot taken at the top of [`ExecutionEngine::finish`]
//! and starts over. The learned `ordering` map is the only state that
//! survives a rollback, and it grows monotonically, so the attempt
//! loop terminates.

mod name;
mod state;

pub use name::DollarName;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::chunk::Code;
use crate::errors::{ErrorKind, EvalResult};
use crate::observer::{NoOpObserver, RuntimeObserver};
use crate::value::{
    check_arity, Builtin, EnvMap, Module, SubIter, Thunk, ThunkKind, Types, Value,
};
use crate::vm::Frame;

use state::ExecutionState;

/// Flag on `$?`: permit reading a value that is still undergoing
/// modification.
pub const GET_PARTIAL: u32 = 1;

/// Flag on `$=`: legal to apply after the initial set.
pub const SET_MODIFICATION: u32 = 1;

/// Flag on `$=`: used only if no non-default initial set exists.
pub const SET_DEFAULT: u32 = 2;

pub struct ExecutionEngine {
    types: Rc<Types>,
    observer: RefCell<Box<dyn RuntimeObserver>>,

    /// Global builtin bindings for top-level environments.
    builtins: EnvMap,

    /// Engine bindings (`$?`, `$=`, `alias`, `subs`, `import`,
    /// `test_thunk`) composed into every top-level environment.
    env_additions: EnvMap,

    modules: RefCell<FxHashMap<SmolStr, Value>>,
    module_thunks: RefCell<FxHashMap<SmolStr, Thunk>>,

    /// Per-attempt state; replaced wholesale on rollback.
    state: RefCell<ExecutionState>,
    initial_state: RefCell<ExecutionState>,

    /// Learned constraints: `ordering[x]` lists the names that must be
    /// committed before `x`. Survives rollback.
    ordering: RefCell<BTreeMap<DollarName, Vec<DollarName>>>,
    resets: Cell<u32>,

    next_thunk_id: Cell<u64>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::with_observer(Box::new(NoOpObserver {}))
    }

    pub fn with_observer(observer: Box<dyn RuntimeObserver>) -> Self {
        let types = Types::new();
        let builtins = crate::builtins::globals(&types);

        let mut env_additions = EnvMap::default();
        env_additions.insert(
            "$?".into(),
            Builtin::new("$?", |engine, args| {
                let [name, flags] = check_arity(args)?;
                engine.dollar_get(DollarName::from_value(name)?, flags.as_int()? as u32)
            }),
        );
        env_additions.insert(
            "$=".into(),
            Builtin::new("$=", |engine, args| {
                let [name, value, flags] = check_arity(args)?;
                engine.dollar_set(
                    DollarName::from_value(name)?,
                    value.clone(),
                    flags.as_int()? as u32,
                )
            }),
        );
        env_additions.insert(
            "alias".into(),
            Builtin::new("alias", |engine, args| {
                let [name, target] = check_arity(args)?;
                engine.make_alias(
                    DollarName::from_value(name)?,
                    DollarName::from_value(target)?,
                );
                Ok(Value::None)
            }),
        );
        env_additions.insert(
            "subs".into(),
            Builtin::new("subs", |engine, args| {
                let [name] = check_arity(args)?;
                let name = engine.dealias(&DollarName::from_value(name)?);
                Ok(Value::SubIter(Rc::new(SubIter { name, position: 0 })))
            }),
        );
        env_additions.insert(
            "import".into(),
            Builtin::new("import", |engine, args| {
                let [name] = check_arity(args)?;
                engine.import(name.as_str()?)
            }),
        );
        env_additions.insert(
            "test_thunk".into(),
            Builtin::new("test_thunk", |engine, args| {
                let [name] = check_arity(args)?;
                Ok(engine.test_thunk(name.as_str()?))
            }),
        );

        ExecutionEngine {
            types,
            observer: RefCell::new(observer),
            builtins,
            env_additions,
            modules: RefCell::new(FxHashMap::default()),
            module_thunks: RefCell::new(FxHashMap::default()),
            state: RefCell::new(ExecutionState::default()),
            initial_state: RefCell::new(ExecutionState::default()),
            ordering: RefCell::new(BTreeMap::new()),
            resets: Cell::new(0),
            next_thunk_id: Cell::new(0),
        }
    }

    pub fn types(&self) -> &Types {
        &self.types
    }

    /// Number of rollbacks performed so far.
    pub fn resets(&self) -> u32 {
        self.resets.get()
    }

    pub(crate) fn observe(&self, f: impl FnOnce(&mut dyn RuntimeObserver)) {
        f(self.observer.borrow_mut().as_mut())
    }

    // ------------------------------------------------------------------
    // Thunk plumbing
    // ------------------------------------------------------------------

    pub(crate) fn make_thunk(&self, kind: ThunkKind) -> Thunk {
        let id = self.next_thunk_id.get();
        self.next_thunk_id.set(id + 1);
        Thunk::new(id, kind)
    }

    /// Record that `dest` wants to be notified with `source`'s value.
    pub(crate) fn subscribe_thunk(&self, source: &Thunk, dest: &Thunk) {
        self.state
            .borrow_mut()
            .subscriptions
            .entry(source.id())
            .or_default()
            .push(dest.clone());
    }

    /// Deliver a value to a thunk. Subscribers are notified from the
    /// resolution loop, not synchronously.
    pub(crate) fn finalize_thunk(&self, source: &Thunk, value: Value) {
        source.mark_finalized();
        self.observe(|o| o.observe_finalize(source, &value));
        self.state.borrow_mut().results.push((source.clone(), value));
    }

    fn notify_thunks(&self) -> EvalResult<()> {
        // Thunk lists are in flux during notification; work off
        // detached copies.
        loop {
            let next = self.state.borrow_mut().results.pop();
            let Some((thunk, value)) = next else {
                return Ok(());
            };
            let subscribers = self
                .state
                .borrow_mut()
                .subscriptions
                .remove(&thunk.id())
                .unwrap_or_default();
            for subscriber in subscribers {
                self.notify_one(&subscriber, &value)?;
            }
        }
    }

    fn notify_one(&self, subscriber: &Thunk, value: &Value) -> EvalResult<()> {
        match subscriber.kind() {
            ThunkKind::Execution { frame } => {
                // A thunk-valued result means the continuation is
                // still not runnable; chase the new producer instead.
                if let Value::Thunk(inner) = value {
                    self.subscribe_thunk(inner, subscriber);
                    return Ok(());
                }
                let resumed = frame.resumed_with(value.clone());
                let env = resumed.execute(self)?;
                self.finalize_thunk(subscriber, Value::Env(Rc::new(env)));
            }

            ThunkKind::NameExtract { name } => {
                let env = value.as_env()?;
                let extracted = env.get(name.as_str()).cloned().unwrap_or(Value::None);
                self.finalize_thunk(subscriber, extracted);
            }

            // Engine-owned thunks are finalized directly by the
            // resolution loop and carry no notification behaviour.
            _ => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dollar protocol
    // ------------------------------------------------------------------

    pub(crate) fn dollar_get(&self, name: DollarName, flags: u32) -> EvalResult<Value> {
        let name = self.dealias(&name);
        if let Some(value) = self.state.borrow().dollar_values.get(&name) {
            return Ok(value.clone());
        }
        let thunk = self.make_thunk(ThunkKind::Get {
            name: name.clone(),
            flags,
        });
        self.state
            .borrow_mut()
            .get_thunks
            .entry(name)
            .or_default()
            .push(thunk.clone());
        Ok(Value::Thunk(thunk))
    }

    pub(crate) fn dollar_set(
        &self,
        name: DollarName,
        value: Value,
        flags: u32,
    ) -> EvalResult<Value> {
        let name = self.dealias(&name);
        let thunk = self.make_thunk(ThunkKind::Set {
            name: name.clone(),
            value,
            flags,
        });
        self.state
            .borrow_mut()
            .set_thunks
            .entry(name)
            .or_default()
            .push(thunk.clone());
        Ok(Value::Thunk(thunk))
    }

    /// Create a placeholder for position `position` of `name`'s child
    /// sequence. The resolution loop finalizes it with
    /// `[next_iter, segment]` or `none`.
    pub(crate) fn make_sub_thunk(&self, name: DollarName, position: usize) -> Value {
        let name = self.dealias(&name);
        let thunk = self.make_thunk(ThunkKind::Sub {
            name: name.clone(),
            position,
        });
        self.state
            .borrow_mut()
            .sub_thunks
            .entry(name)
            .or_default()
            .push(thunk.clone());
        Value::Thunk(thunk)
    }

    pub(crate) fn test_thunk(&self, name: &str) -> Value {
        let thunk = self.make_thunk(ThunkKind::Test { name: name.into() });
        self.state.borrow_mut().test_thunks.push(thunk.clone());
        Value::Thunk(thunk)
    }

    /// Redirect `name` (and its descendants) to `target`. If anything
    /// under `name` has already been resolved, a synthetic plain set
    /// is injected so the next consistency check rolls the attempt
    /// back and the alias applies from the start of the next one.
    pub(crate) fn make_alias(&self, name: DollarName, target: DollarName) {
        let mut state = self.state.borrow_mut();
        state.aliases.insert(name.clone(), target);

        let already_resolved: Option<(DollarName, Value)> = state
            .dollar_values
            .iter()
            .find(|(key, _)| name.is_prefix_of(key))
            .map(|(key, value)| (key.clone(), value.clone()));

        if let Some((key, value)) = already_resolved {
            let thunk = self.make_thunk(ThunkKind::Set {
                name: key.clone(),
                value,
                flags: 0,
            });
            state.set_thunks.entry(key).or_default().push(thunk);
            return;
        }

        // Re-key pending reads and writes through the new alias.
        let aliases = state.aliases.clone();
        let rekey = |map: BTreeMap<DollarName, Vec<Thunk>>| {
            let mut rebuilt: BTreeMap<DollarName, Vec<Thunk>> = BTreeMap::new();
            for (key, thunks) in map {
                let key = if name.is_prefix_of(&key) {
                    name::dealias_with(&aliases, &key)
                } else {
                    key
                };
                rebuilt.entry(key).or_default().extend(thunks);
            }
            rebuilt
        };
        state.get_thunks = rekey(std::mem::take(&mut state.get_thunks));
        state.set_thunks = rekey(std::mem::take(&mut state.set_thunks));
    }

    /// Resolve aliases by walking the segments left to right,
    /// substituting any matching prefix until a fixed point.
    pub fn dealias(&self, name: &DollarName) -> DollarName {
        name::dealias_with(&self.state.borrow().aliases, name)
    }

    fn import(&self, name: &str) -> EvalResult<Value> {
        if let Some(module) = self.modules.borrow().get(name) {
            return Ok(module.clone());
        }
        if let Some(thunk) = self.module_thunks.borrow().get(name) {
            return Ok(Value::Thunk(thunk.clone()));
        }
        Err(ErrorKind::UnknownModule(name.into()).into())
    }

    // ------------------------------------------------------------------
    // Module execution
    // ------------------------------------------------------------------

    /// Pre-register a module thunk, to be finalized when the module
    /// of that name finishes executing.
    pub fn register_module(&self, name: &str) {
        let thunk = self.make_thunk(ThunkKind::Module { name: name.into() });
        self.module_thunks.borrow_mut().insert(name.into(), thunk);
    }

    pub fn exec_file(&self, path: &Path) -> EvalResult<()> {
        self.exec_code(Code::from_file(path)?)
    }

    /// Execute a code unit's top-level frame and wrap the resulting
    /// environment as a module.
    pub fn exec_code(&self, code: Rc<Code>) -> EvalResult<()> {
        self.observe(|o| o.observe_code_loaded(&code));

        let mut env = self.builtins.clone();
        for (key, value) in &self.env_additions {
            env.insert(key.clone(), value.clone());
        }

        let frame = Frame::new(code.clone(), 0, env);
        let mut end_env = frame.execute(self)?;

        let modulename = SmolStr::from(code.modulename());

        // Already-loaded submodules become bindings of this module.
        {
            let modules = self.modules.borrow();
            let prefix = format!("{}.", modulename);
            for (name, module) in modules.iter() {
                if let Some(child) = name.as_str().strip_prefix(prefix.as_str()) {
                    if !child.contains('.') {
                        end_env.insert(SmolStr::from(child), module.clone());
                    }
                }
            }
        }

        let module = Value::Module(Rc::new(Module {
            name: modulename.clone(),
            bindings: end_env,
        }));
        self.modules
            .borrow_mut()
            .insert(modulename.clone(), module.clone());

        let pending = self.module_thunks.borrow().get(&modulename).cloned();
        if let Some(thunk) = pending {
            self.finalize_thunk(&thunk, module);
        }

        Ok(())
    }

    /// Execute a runspec mapping: pre-register `modules`, load and
    /// execute `files`, then an optional `conclusion` code unit.
    pub fn exec_runspec(&self, spec: &Value) -> EvalResult<()> {
        let dict = spec
            .as_dict()
            .map_err(|_| ErrorKind::BadRunspec("runspec must be a mapping".into()))?;

        if let Some(modules) = dict.get_str("modules") {
            for module in modules.as_list()?.iter() {
                self.register_module(module.as_str()?);
            }
        }

        if let Some(files) = dict.get_str("files") {
            for file in files.as_list()?.iter() {
                self.exec_file(Path::new(file.as_str()?))?;
            }
        }

        match dict.get_str("conclusion") {
            None | Some(Value::None) => {}
            Some(Value::Bytes(bytes)) => {
                let code = Code::from_reader(&mut bytes.as_ref())?;
                self.exec_code(code)?;
            }
            Some(other) => {
                return Err(ErrorKind::BadRunspec(format!(
                    "conclusion must be bytes or none, not '{}'",
                    other.type_name()
                ))
                .into())
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Resolution loop
    // ------------------------------------------------------------------

    /// Drive resolution until quiescent and return the final
    /// dollar-value map.
    pub fn finish(&self) -> EvalResult<BTreeMap<DollarName, Value>> {
        *self.initial_state.borrow_mut() = self.state.borrow().clone();

        'attempt: loop {
            loop {
                self.notify_thunks()?;
                if self.check_consistency()? {
                    continue 'attempt;
                }

                let delivered_gets = self.deliver_get_thunks();
                let delivered_subs = self.deliver_sub_thunks();
                if delivered_gets || delivered_subs {
                    continue;
                }

                if self.state.borrow().has_pending_work() {
                    match self.pick_next_dollar_name() {
                        Some(name) => self.resolve_dollar(&name)?,
                        None => match self.pick_dummy_name() {
                            Some(name) => self.resolve_dummy(&name),
                            None => {
                                return Err(ErrorKind::Deadlock(
                                    "pending dollar work but no name is resolvable".into(),
                                )
                                .into())
                            }
                        },
                    }
                    continue;
                }

                // Quiescent: drain the deferred barriers.
                let test = self.state.borrow_mut().test_thunks.pop();
                match test {
                    Some(thunk) => self.finalize_thunk(&thunk, Value::Integer(1)),
                    None => break,
                }
            }

            return Ok(self.state.borrow().dollar_values.clone());
        }
    }

    /// Pick a name with a pending initial (or default) set whose
    /// learned prerequisites are all committed.
    fn pick_next_dollar_name(&self) -> Option<DollarName> {
        let state = self.state.borrow();
        let ordering = self.ordering.borrow();

        for (name, thunks) in &state.set_thunks {
            let eligible = thunks.iter().any(|t| {
                matches!(t.kind(), ThunkKind::Set { flags, .. } if flags & SET_MODIFICATION == 0)
            });
            if !eligible {
                continue;
            }
            if self.ordering_met(&ordering, &state, name) {
                return Some(name.clone());
            }
        }
        None
    }

    /// Pick a name that will never be set but blocks pending reads or
    /// child enumerations.
    fn pick_dummy_name(&self) -> Option<DollarName> {
        let state = self.state.borrow();
        let ordering = self.ordering.borrow();

        for name in state.get_thunks.keys().chain(state.sub_thunks.keys()) {
            if state.dollar_values.contains_key(name) {
                continue;
            }
            if self.ordering_met(&ordering, &state, name) {
                return Some(name.clone());
            }
        }
        None
    }

    fn ordering_met(
        &self,
        ordering: &BTreeMap<DollarName, Vec<DollarName>>,
        state: &ExecutionState,
        name: &DollarName,
    ) -> bool {
        ordering.get(name).map_or(true, |before| {
            before
                .iter()
                .all(|dep| state.dollar_values.contains_key(dep))
        })
    }

    /// Commit a value for `name`: apply its initial and default sets,
    /// publish newly-discovered child segments, run the
    /// modification/partial-read loop, then finalize the remaining
    /// reads with the committed value.
    fn resolve_dollar(&self, name: &DollarName) -> EvalResult<()> {
        self.observe(|o| o.observe_resolve(name));
        self.state.borrow_mut().resolution_order.push(name.clone());

        let mut value = Value::None;

        // Initial and default sets recorded so far. Exactly one
        // non-default initial set is permitted; defaults apply only
        // in its absence.
        {
            let pending = self
                .state
                .borrow_mut()
                .set_thunks
                .remove(name)
                .unwrap_or_default();
            let mut modifications = Vec::new();
            let mut ready = Vec::new();
            let mut has_initial = false;

            for thunk in pending {
                let (set_value, flags) = match thunk.kind() {
                    ThunkKind::Set { value, flags, .. } => (value.clone(), *flags),
                    _ => continue,
                };
                if flags & SET_MODIFICATION != 0 {
                    modifications.push(thunk);
                    continue;
                }
                if flags & SET_DEFAULT != 0 {
                    if !has_initial {
                        value = set_value;
                    }
                } else {
                    if has_initial {
                        return Err(
                            ErrorKind::DuplicateInitialSet(name.to_string()).into()
                        );
                    }
                    has_initial = true;
                    value = set_value;
                }
                ready.push(thunk);
            }

            if !modifications.is_empty() {
                self.state
                    .borrow_mut()
                    .set_thunks
                    .insert(name.clone(), modifications);
            }
            for thunk in ready {
                self.finalize_thunk(&thunk, Value::None);
            }
        }

        self.discover_children(name);

        // Apply modifications as their producers wake up, handing the
        // intermediate value to partial reads one at a time.
        loop {
            self.notify_thunks()?;

            let next_set = {
                let mut state = self.state.borrow_mut();
                match state.set_thunks.get_mut(name) {
                    Some(list) if !list.is_empty() => {
                        let thunk = list.remove(0);
                        if list.is_empty() {
                            state.set_thunks.remove(name);
                        }
                        Some(thunk)
                    }
                    _ => None,
                }
            };
            if let Some(thunk) = next_set {
                let (set_value, flags) = match thunk.kind() {
                    ThunkKind::Set { value, flags, .. } => (value.clone(), *flags),
                    _ => unreachable!("set map contains only set thunks"),
                };
                if flags & SET_MODIFICATION == 0 {
                    return Err(ErrorKind::LateInitialSet(name.to_string()).into());
                }
                value = set_value;
                self.finalize_thunk(&thunk, Value::None);
                continue;
            }

            let partial = {
                let mut state = self.state.borrow_mut();
                let mut found = None;
                if let Some(list) = state.get_thunks.get_mut(name) {
                    let position = list.iter().position(|t| {
                        matches!(t.kind(), ThunkKind::Get { flags, .. } if flags & GET_PARTIAL != 0)
                    });
                    if let Some(idx) = position {
                        found = Some(list.remove(idx));
                        if list.is_empty() {
                            state.get_thunks.remove(name);
                        }
                    }
                }
                found
            };
            if let Some(thunk) = partial {
                self.finalize_thunk(&thunk, value.clone());
                continue;
            }

            break;
        }

        // Commit, then satisfy the remaining reads.
        self.notify_thunks()?;
        self.state
            .borrow_mut()
            .dollar_values
            .insert(name.clone(), value.clone());
        let gets = self
            .state
            .borrow_mut()
            .get_thunks
            .remove(name)
            .unwrap_or_default();
        for get in gets {
            self.finalize_thunk(&get, value.clone());
        }
        self.notify_thunks()?;

        Ok(())
    }

    /// Commit the empty value for a name nothing will ever set, so
    /// reads deliver `none` and child enumerations can terminate.
    fn resolve_dummy(&self, name: &DollarName) {
        self.observe(|o| o.observe_dummy_resolve(name));
        {
            let mut state = self.state.borrow_mut();
            state.resolution_order.push(name.clone());
            state.dollar_values.insert(name.clone(), Value::None);
            state.dummy_resolved.insert(name.clone());
        }
        self.discover_children(name);
    }

    /// Walk `name`'s ancestor chain; every ancestor that has not seen
    /// this child segment yet appends it and delivers any sub-thunk
    /// waiting at that position.
    fn discover_children(&self, name: &DollarName) {
        for (parent, segment) in name.ancestors() {
            let new_position = {
                let mut state = self.state.borrow_mut();
                let known = state.sub_names.entry(parent.clone()).or_default();
                if known.contains(&segment) {
                    None
                } else {
                    known.push(segment.clone());
                    Some(known.len() - 1)
                }
            };

            if let Some(position) = new_position {
                let waiting = self.take_sub_thunks_at(&parent, position);
                for thunk in waiting {
                    self.finalize_thunk(&thunk, sub_pair(&parent, position, &segment));
                }
            }
        }
    }

    fn take_sub_thunks_at(&self, parent: &DollarName, position: usize) -> Vec<Thunk> {
        let mut state = self.state.borrow_mut();
        let Some(list) = state.sub_thunks.get_mut(parent) else {
            return vec![];
        };
        let mut taken = Vec::new();
        list.retain(|thunk| {
            let here = matches!(thunk.kind(), ThunkKind::Sub { position: p, .. } if *p == position);
            if here {
                taken.push(thunk.clone());
            }
            !here
        });
        if list.is_empty() {
            state.sub_thunks.remove(parent);
        }
        taken
    }

    /// Finalize reads whose names have become resolved.
    fn deliver_get_thunks(&self) -> bool {
        let ready: Vec<(Thunk, Value)> = {
            let state = &mut *self.state.borrow_mut();
            let resolved: Vec<DollarName> = state
                .get_thunks
                .keys()
                .filter(|name| state.dollar_values.contains_key(*name))
                .cloned()
                .collect();

            let mut out = Vec::new();
            for name in resolved {
                let value = state.dollar_values[&name].clone();
                for thunk in state.get_thunks.remove(&name).unwrap_or_default() {
                    out.push((thunk, value.clone()));
                }
            }
            out
        };

        let delivered = !ready.is_empty();
        for (thunk, value) in ready {
            self.finalize_thunk(&thunk, value);
        }
        delivered
    }

    /// Finalize child enumerations: positions already discovered get
    /// their `[next_iter, segment]` pair, and positions past the end
    /// of a resolved parent terminate with `none`.
    fn deliver_sub_thunks(&self) -> bool {
        let ready: Vec<(Thunk, Value)> = {
            let state = &mut *self.state.borrow_mut();
            let parents: Vec<DollarName> = state.sub_thunks.keys().cloned().collect();

            let mut out = Vec::new();
            for parent in parents {
                let known = state.sub_names.get(&parent).cloned().unwrap_or_default();
                let resolved = state.dollar_values.contains_key(&parent);
                let list = state.sub_thunks.get_mut(&parent).expect("key just listed");

                let mut remaining = Vec::new();
                for thunk in list.drain(..) {
                    let position = match thunk.kind() {
                        ThunkKind::Sub { position, .. } => *position,
                        _ => continue,
                    };
                    if position < known.len() {
                        let pair = sub_pair(&parent, position, &known[position]);
                        out.push((thunk, pair));
                    } else if resolved {
                        out.push((thunk, Value::None));
                    } else {
                        remaining.push(thunk);
                    }
                }

                if remaining.is_empty() {
                    state.sub_thunks.remove(&parent);
                } else {
                    *state.sub_thunks.get_mut(&parent).expect("entry exists") = remaining;
                }
            }
            out
        };

        let delivered = !ready.is_empty();
        for (thunk, value) in ready {
            self.finalize_thunk(&thunk, value);
        }
        delivered
    }

    /// Scan the pending sets for contradictions with what has already
    /// been committed. On conflict, learn the ordering edge and roll
    /// back. Returns whether a rollback happened.
    fn check_consistency(&self) -> EvalResult<bool> {
        let conflict = {
            let state = self.state.borrow();
            let mut found = None;

            'scan: for (name, thunks) in &state.set_thunks {
                if thunks.is_empty() {
                    continue;
                }
                if state.dollar_values.contains_key(name) {
                    found = Some(name.clone());
                    break;
                }
                for (prefix, _) in name.ancestors() {
                    if state.dummy_resolved.contains(&prefix) {
                        found = Some(prefix);
                        break 'scan;
                    }
                }
            }

            found.map(|target| (target, state.resolution_order.last().cloned()))
        };

        let Some((target, revealed_by)) = conflict else {
            return Ok(false);
        };

        let revealed_by = revealed_by
            .ok_or_else(|| ErrorKind::CircularDependency(target.to_string()))?;
        if revealed_by == target {
            return Err(ErrorKind::CircularDependency(target.to_string()).into());
        }

        {
            let mut ordering = self.ordering.borrow_mut();
            let edges = ordering.entry(target.clone()).or_default();
            if edges.contains(&revealed_by) {
                // Re-learning a known edge cannot make progress.
                return Err(ErrorKind::CircularDependency(target.to_string()).into());
            }
            edges.push(revealed_by.clone());
        }

        self.observe(|o| o.observe_conflict(&target, &revealed_by));
        *self.state.borrow_mut() = self.initial_state.borrow().clone();
        self.resets.set(self.resets.get() + 1);
        self.observe(|o| o.observe_reset(self.resets.get()));
        Ok(true)
    }
}

fn sub_pair(parent: &DollarName, position: usize, segment: &SmolStr) -> Value {
    Value::List(Rc::new(vec![
        Value::SubIter(Rc::new(SubIter {
            name: parent.clone(),
            position: position + 1,
        })),
        Value::from(segment.as_str()),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::CodeBuilder;
    use crate::value::EnvMap;
    use std::cell::RefCell;

    fn of(segments: &[&str]) -> DollarName {
        DollarName::of(segments)
    }

    /// Observer that records every finalization for assertions.
    #[derive(Clone, Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<(String, Value)>>>,
    }

    impl RuntimeObserver for Recorder {
        fn observe_finalize(&mut self, thunk: &Thunk, value: &Value) {
            self.events
                .borrow_mut()
                .push((thunk.to_string(), value.clone()));
        }
    }

    fn recorded_engine() -> (ExecutionEngine, Recorder) {
        let recorder = Recorder::default();
        let engine = ExecutionEngine::with_observer(Box::new(recorder.clone()));
        (engine, recorder)
    }

    #[test]
    fn resolved_get_returns_the_value_directly() {
        let engine = ExecutionEngine::new();
        engine.dollar_set(of(&["a"]), Value::Integer(1), 0).unwrap();
        engine.finish().unwrap();

        let direct = engine.dollar_get(of(&["a"]), 0).unwrap();
        assert_eq!(direct, Value::Integer(1));
    }

    #[test]
    fn duplicate_initial_sets_are_fatal() {
        let engine = ExecutionEngine::new();
        engine.dollar_set(of(&["a"]), Value::Integer(1), 0).unwrap();
        engine.dollar_set(of(&["a"]), Value::Integer(2), 0).unwrap();

        let err = engine.finish().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateInitialSet(_)));
    }

    #[test]
    fn modification_only_set_deadlocks() {
        let engine = ExecutionEngine::new();
        engine
            .dollar_set(of(&["m"]), Value::Integer(1), SET_MODIFICATION)
            .unwrap();

        let err = engine.finish().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Deadlock(_)));
    }

    #[test]
    fn default_yields_to_initial_set() {
        let engine = ExecutionEngine::new();
        engine
            .dollar_set(of(&["k"]), Value::Integer(1), SET_DEFAULT)
            .unwrap();
        engine.dollar_set(of(&["k"]), Value::Integer(9), 0).unwrap();

        let values = engine.finish().unwrap();
        assert_eq!(values[&of(&["k"])], Value::Integer(9));
    }

    #[test]
    fn child_enumeration_reports_segments_then_terminates() {
        let (engine, recorder) = recorded_engine();
        engine
            .dollar_set(of(&["p", "a"]), Value::Integer(1), 0)
            .unwrap();
        engine
            .dollar_set(of(&["p", "b"]), Value::Integer(2), 0)
            .unwrap();
        engine.make_sub_thunk(of(&["p"]), 0);
        engine.make_sub_thunk(of(&["p"]), 1);
        engine.make_sub_thunk(of(&["p"]), 2);

        let values = engine.finish().unwrap();
        assert_eq!(values[&of(&["p", "a"])], Value::Integer(1));
        assert_eq!(values[&of(&["p", "b"])], Value::Integer(2));
        // The parent itself was dummy-resolved to terminate the
        // enumeration.
        assert_eq!(values[&of(&["p"])], Value::None);
        assert_eq!(engine.resets(), 0);

        let events = recorder.events.borrow();
        let payload = |key: &str| {
            events
                .iter()
                .find(|(thunk, _)| thunk == key)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| panic!("no finalization recorded for {}", key))
        };
        assert_eq!(payload("SubT(p@0)"), "[SubIter(p@1), a]");
        assert_eq!(payload("SubT(p@1)"), "[SubIter(p@2), b]");
        assert_eq!(payload("SubT(p@2)"), "NONE");
    }

    #[test]
    fn test_thunks_drain_once_quiescent() {
        let (engine, recorder) = recorded_engine();
        engine.test_thunk("barrier");
        engine.dollar_set(of(&["a"]), Value::Integer(1), 0).unwrap();

        engine.finish().unwrap();

        let events = recorder.events.borrow();
        assert!(events
            .iter()
            .any(|(thunk, value)| thunk == "TT(barrier)" && *value == Value::Integer(1)));
    }

    #[test]
    fn conflict_rolls_back_to_the_snapshot() {
        let engine = ExecutionEngine::new();
        engine.dollar_set(of(&["a"]), Value::Integer(1), 0).unwrap();
        engine.dollar_set(of(&["b"]), Value::Integer(2), 0).unwrap();
        *engine.initial_state.borrow_mut() = engine.state.borrow().clone();

        engine.resolve_dollar(&of(&["a"])).unwrap();
        engine.resolve_dollar(&of(&["b"])).unwrap();
        // A set for `a` surfaces after `a` was already committed.
        engine.dollar_set(of(&["a"]), Value::Integer(5), 0).unwrap();

        assert!(engine.check_consistency().unwrap());
        assert_eq!(engine.resets(), 1);

        let state = engine.state.borrow();
        assert!(state.dollar_values.is_empty());
        assert!(state.resolution_order.is_empty());
        assert_eq!(state.set_thunks.len(), 2);
        assert_eq!(
            engine.ordering.borrow()[&of(&["a"])],
            vec![of(&["b"])],
            "the conflict is attributed to the revealing resolution"
        );
    }

    #[test]
    fn rediscovering_a_known_edge_is_circular() {
        let engine = ExecutionEngine::new();
        engine.dollar_set(of(&["a"]), Value::Integer(1), 0).unwrap();
        *engine.initial_state.borrow_mut() = engine.state.borrow().clone();

        engine.resolve_dollar(&of(&["a"])).unwrap();
        engine.dollar_set(of(&["a"]), Value::Integer(5), 0).unwrap();
        let err = engine.check_consistency().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CircularDependency(_)));
    }

    #[test]
    fn alias_over_resolved_name_injects_a_conflicting_set() {
        let engine = ExecutionEngine::new();
        engine.dollar_set(of(&["y"]), Value::Integer(1), 0).unwrap();
        *engine.initial_state.borrow_mut() = engine.state.borrow().clone();
        engine.resolve_dollar(&of(&["y"])).unwrap();

        engine.make_alias(of(&["y"]), of(&["z"]));
        assert!(
            engine.state.borrow().set_thunks.contains_key(&of(&["y"])),
            "a synthetic set forces the next consistency check to conflict"
        );
    }

    #[test]
    fn alias_rekeys_pending_thunks() {
        let engine = ExecutionEngine::new();
        engine.dollar_get(of(&["x", "a"]), 0).unwrap();
        engine.make_alias(of(&["x"]), of(&["y"]));

        let state = engine.state.borrow();
        assert!(state.get_thunks.contains_key(&of(&["y", "a"])));
        assert!(!state.get_thunks.contains_key(&of(&["x", "a"])));
    }

    #[test]
    fn resuming_a_continuation_matches_direct_execution() {
        // Executing a frame with the thunk's value substituted up
        // front must agree with suspending on the thunk and resuming
        // after it finalizes.
        let build = || {
            CodeBuilder::new("t")
                .op_get("x")
                .op_const(Value::Integer(1))
                .op_binop("+")
                .op_set("y")
                .build()
        };

        // Direct execution.
        let engine = ExecutionEngine::new();
        let mut env = EnvMap::default();
        env.insert("x".into(), Value::Integer(5));
        let direct = Frame::new(build(), 0, env).execute(&engine).unwrap();
        assert_eq!(direct.get("y"), Some(&Value::Integer(6)));

        // Suspended execution.
        let (engine, recorder) = recorded_engine();
        let thunk = engine.make_thunk(ThunkKind::Get {
            name: of(&["in"]),
            flags: 0,
        });
        let mut env = EnvMap::default();
        env.insert("x".into(), Value::Thunk(thunk.clone()));
        let suspended = Frame::new(build(), 0, env).execute(&engine).unwrap();
        assert!(
            matches!(suspended.get("return"), Some(Value::Thunk(_))),
            "the deferred remainder exports its return binding"
        );

        engine.finalize_thunk(&thunk, Value::Integer(5));
        engine.notify_thunks().unwrap();

        let events = recorder.events.borrow();
        let resumed_env = events
            .iter()
            .find_map(|(_, value)| match value {
                Value::Env(env) => Some(env.clone()),
                _ => None,
            })
            .expect("the continuation finalized with an environment");
        assert_eq!(resumed_env.get("y"), direct.get("y"));
    }

    #[test]
    fn import_prefers_loaded_modules_and_falls_back_to_thunks() {
        let engine = ExecutionEngine::new();
        assert!(matches!(
            engine.import("nowhere").unwrap_err().kind,
            ErrorKind::UnknownModule(_)
        ));

        engine.register_module("pending");
        assert!(matches!(
            engine.import("pending").unwrap(),
            Value::Thunk(_)
        ));
    }
}

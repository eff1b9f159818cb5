//! Native Runtime Host
//!
//! The loader state machine of the emitted artifact, hosted in Rust for
//! module bodies given as closures. Used to exercise loading semantics
//! (caching, cycles, unknown modules) without a JavaScript engine.
//!
//! ```text
//! Unloaded ──require──▶ Executing ──body returns──▶ Loaded
//!     ▲                     │
//!     └──── body fails ─────┘
//! ```
//!
//! With the cache enabled, `require` of an Executing module returns its
//! partially populated exports and `require` of a Loaded module returns the
//! same exports object every time. With the cache disabled every `require`
//! runs the body again, so a cycle only stops at the depth limit.

use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::trace;

use crate::error::RuntimeError;
use crate::table::{ModuleId, ModuleRecord, ModuleTable};

pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Shared, mutable exports object of one module execution.
pub type Exports = Rc<RefCell<Map<String, Value>>>;

pub type ModuleBody = Box<dyn Fn(&mut ModuleContext<'_>) -> Result<(), RuntimeError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unloaded,
    Executing,
    Loaded,
}

struct Definition {
    deps: BTreeMap<String, ModuleId>,
    body: ModuleBody,
}

struct Slot {
    state: ModuleState,
    exports: Exports,
    executions: usize,
}

pub struct ModuleRuntime {
    modules: HashMap<ModuleId, Definition>,
    slots: RefCell<HashMap<ModuleId, Slot>>,
    cache: bool,
    max_depth: usize,
    depth: Cell<usize>,
}

impl ModuleRuntime {
    pub fn new(cache: bool) -> Self {
        Self {
            modules: HashMap::new(),
            slots: RefCell::new(HashMap::new()),
            cache,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: Cell::new(0),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Registers a module. A second definition for the same id replaces the
    /// first.
    pub fn define<F>(&mut self, id: ModuleId, deps: BTreeMap<String, ModuleId>, body: F)
    where
        F: Fn(&mut ModuleContext<'_>) -> Result<(), RuntimeError> + 'static,
    {
        self.modules.insert(
            id,
            Definition {
                deps,
                body: Box::new(body),
            },
        );
    }

    /// Builds a runtime whose dependency maps come from `table` and whose
    /// bodies come from `compile`.
    pub fn from_table<F>(table: &ModuleTable, cache: bool, compile: F) -> Self
    where
        F: Fn(&ModuleRecord) -> ModuleBody,
    {
        let mut runtime = Self::new(cache);
        for record in table.records() {
            runtime.modules.insert(
                record.id.clone(),
                Definition {
                    deps: record.deps.clone(),
                    body: compile(record),
                },
            );
        }
        runtime
    }

    /// Runs the entry module. Its exports are discarded.
    pub fn run_entry(&self, entry: &ModuleId) -> Result<(), RuntimeError> {
        self.require(entry).map(|_| ())
    }

    pub fn require(&self, id: &ModuleId) -> Result<Exports, RuntimeError> {
        let definition = self
            .modules
            .get(id)
            .ok_or_else(|| RuntimeError::UnknownModule(id.to_string()))?;

        if self.cache {
            if let Some(slot) = self.slots.borrow().get(id) {
                if slot.state != ModuleState::Unloaded {
                    return Ok(Rc::clone(&slot.exports));
                }
            }
        }

        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(RuntimeError::RunawayRequire {
                module: id.to_string(),
                depth,
            });
        }

        let exports: Exports = Rc::new(RefCell::new(Map::new()));
        {
            let mut slots = self.slots.borrow_mut();
            let slot = slots.entry(id.clone()).or_insert_with(|| Slot {
                state: ModuleState::Unloaded,
                exports: Rc::clone(&exports),
                executions: 0,
            });
            slot.state = ModuleState::Executing;
            slot.exports = Rc::clone(&exports);
            slot.executions += 1;
        }
        trace!(module = %id, depth, "executing");

        let mut context = ModuleContext {
            runtime: self,
            id,
            deps: &definition.deps,
            exports: Rc::clone(&exports),
        };
        self.depth.set(depth + 1);
        let result = (definition.body)(&mut context);
        self.depth.set(depth);

        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots.get_mut(id) {
            slot.state = if result.is_ok() {
                ModuleState::Loaded
            } else {
                ModuleState::Unloaded
            };
        }
        result.map(|_| exports)
    }

    pub fn state(&self, id: &ModuleId) -> ModuleState {
        self.slots
            .borrow()
            .get(id)
            .map_or(ModuleState::Unloaded, |s| s.state)
    }

    /// How many times the body of `id` has started running.
    pub fn executions(&self, id: &ModuleId) -> usize {
        self.slots.borrow().get(id).map_or(0, |s| s.executions)
    }
}

/// What a module body sees: its own `require`, bound to its dependency map,
/// and its `exports`.
pub struct ModuleContext<'r> {
    runtime: &'r ModuleRuntime,
    id: &'r ModuleId,
    deps: &'r BTreeMap<String, ModuleId>,
    exports: Exports,
}

impl<'r> ModuleContext<'r> {
    pub fn id(&self) -> &ModuleId {
        self.id
    }

    /// Loads a dependency by the specifier written in this module. There is
    /// no path resolution at runtime: the specifier must be in `deps`.
    pub fn require(&mut self, specifier: &str) -> Result<Exports, RuntimeError> {
        let target = self.deps.get(specifier).ok_or_else(|| {
            RuntimeError::UnknownModule(format!("{} (required from {})", specifier, self.id))
        })?;
        self.runtime.require(target)
    }

    pub fn export(&self, name: &str, value: impl Into<Value>) {
        self.exports.borrow_mut().insert(name.to_string(), value.into());
    }

    pub fn exports(&self) -> Exports {
        Rc::clone(&self.exports)
    }

    /// Error for a body that fails on its own terms.
    pub fn throw(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::Thrown {
            module: self.id.to_string(),
            message: message.into(),
        }
    }
}

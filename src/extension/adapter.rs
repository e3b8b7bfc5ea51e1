//! Extension adapter
//!
//! The adapter owns everything one loaded module can touch: its linear
//! memory, the argument stack and heap carved out of it, the reference
//! table, the context tree, the request router and the C library state.
//!
//! ## Borrowing
//!
//! State lives behind a single `RefCell`. Every accessor borrows it for the
//! duration of one closure (`with_state`), and no borrow is ever held while
//! module code runs. Module code calls back into the adapter re-entrantly,
//! so a borrow held across `call_export` or a table call would panic.
//!
//! ## Faults
//!
//! `exit`, `abort` and traps unwind as `Err(Fault)` to whichever host entry
//! point started the call. `terminate` records the exit status and tears the
//! adapter down; every later call fails with `ExtensionError::Destroyed`.

use super::abi::{ModuleLayout, NULL, exports};
use super::context::{ContextTree, PolicySet};
use super::error::{ExtensionError, ExtensionResult, Fault};
use super::instance::{ModuleInstance, Value};
use super::libc::{Libc, LibcState};
use super::memory::{Heap, LinearMemory, Stack, StackValue};
use super::reference::{HostValue, ReferenceTable};
use super::sapi::Sapi;
use super::table::{Argument, IndirectCallTable};
use crate::ipc::bus::HostBus;
use crate::ipc::result::{Reply, Responder};
use crate::ipc::router::Router;
use crate::platform::{ConsoleSink, Scheduler};
use serde::{Deserialize, Serialize};
use std::cell::{OnceCell, Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Runtime configuration for one adapter
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    /// Policies of the root context
    pub policies: PolicySet,
    /// Initial environment seen by `getenv`
    pub env: BTreeMap<String, String>,
    /// Application config at the bottom of every context's config chain
    pub config: BTreeMap<String, String>,
}

/// Metadata a module exports about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionInfo {
    pub abi: u32,
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Everything mutable about one adapter
pub struct AdapterState {
    pub memory: LinearMemory,
    pub stack: Stack,
    pub heap: Heap,
    pub references: ReferenceTable,
    pub contexts: ContextTree,
    pub router: Router,
    pub libc: LibcState,
    layout: ModuleLayout,
    root: u32,
    policies: Option<PolicySet>,
    exit_status: Option<i32>,
    destroyed: bool,
    pending_fault: Option<Fault>,
}

impl AdapterState {
    fn new(memory: LinearMemory, options: AdapterOptions) -> Self {
        Self {
            memory,
            stack: Stack::new(NULL, NULL),
            heap: Heap::new(NULL, NULL),
            references: ReferenceTable::new(),
            contexts: ContextTree::new(options.config),
            router: Router::new(),
            libc: LibcState::new(options.env),
            layout: ModuleLayout::default(),
            root: NULL,
            policies: Some(options.policies),
            exit_status: None,
            destroyed: false,
            pending_fault: None,
        }
    }

    pub fn layout(&self) -> ModuleLayout {
        self.layout
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    /// Free a heap address, evicting whatever handle or context used it
    pub fn free(&mut self, ptr: u32) -> bool {
        if ptr == NULL {
            return false;
        }
        self.contexts.forget(ptr);
        self.references.release(ptr);
        self.heap.free(ptr)
    }

    /// Allocate in the pool of `ctx`
    pub fn context_alloc(&mut self, ctx: u32, size: u32) -> u32 {
        self.contexts.alloc(&mut self.heap, ctx, size)
    }

    pub fn create_context(&mut self, parent: Option<u32>, retained: bool) -> u32 {
        self.contexts.create(&mut self.heap, parent, retained, None)
    }

    pub fn release_context(&mut self, ctx: u32) -> bool {
        self.contexts
            .release(&mut self.heap, &mut self.references, ctx)
    }

    /// Bind `value` to a fresh handle owned by `ctx`
    pub fn create_reference(&mut self, ctx: u32, value: HostValue) -> u32 {
        let handle = self.context_alloc(ctx, super::abi::POINTER_SIZE);
        self.references.insert(handle, value);
        handle
    }

    /// Existing handle for `value`, or a new one owned by `ctx`
    pub fn find_or_create_reference(&mut self, ctx: u32, value: HostValue) -> u32 {
        match self.references.reverse_lookup(&value) {
            NULL => self.create_reference(ctx, value),
            handle => handle,
        }
    }

    /// Context owning the allocation behind `handle`
    pub fn owner_of(&self, handle: u32) -> Option<u32> {
        self.contexts.owner_of(handle)
    }

    pub fn push(&mut self, value: StackValue<'_>) -> Result<u32, Fault> {
        Ok(self.stack.push(&mut self.memory, value)?)
    }

    pub fn read_cstring(&self, ptr: u32) -> Result<Option<String>, Fault> {
        Ok(self.memory.read_cstring(ptr)?)
    }
}

struct AdapterInner {
    state: RefCell<AdapterState>,
    instance: OnceCell<Rc<dyn ModuleInstance>>,
    bus: Rc<dyn HostBus>,
    console: Rc<dyn ConsoleSink>,
    scheduler: Scheduler,
}

/// Shared handle to an adapter
#[derive(Clone)]
pub struct Adapter {
    inner: Rc<AdapterInner>,
}

/// A handle that does not keep the adapter alive
///
/// Deferred callbacks and import closures hold one of these so that the
/// adapter can be dropped while they are still registered.
#[derive(Clone)]
pub struct WeakAdapter {
    inner: Weak<AdapterInner>,
}

impl WeakAdapter {
    pub fn upgrade(&self) -> Option<Adapter> {
        self.inner.upgrade().map(|inner| Adapter { inner })
    }
}

impl Adapter {
    pub fn new(
        memory: LinearMemory,
        bus: Rc<dyn HostBus>,
        console: Rc<dyn ConsoleSink>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            inner: Rc::new(AdapterInner {
                state: RefCell::new(AdapterState::new(memory, options)),
                instance: OnceCell::new(),
                bus,
                console,
                scheduler: Scheduler::new(),
            }),
        }
    }

    /// Bind the module instance; only the first call has any effect
    pub fn attach(&self, instance: Rc<dyn ModuleInstance>) -> bool {
        self.inner.instance.set(instance).is_ok()
    }

    pub fn instance(&self) -> Result<Rc<dyn ModuleInstance>, Fault> {
        self.inner
            .instance
            .get()
            .cloned()
            .ok_or_else(|| Fault::Trap("no module instance attached".to_string()))
    }

    pub fn downgrade(&self) -> WeakAdapter {
        WeakAdapter {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn bus(&self) -> Rc<dyn HostBus> {
        Rc::clone(&self.inner.bus)
    }

    pub fn console(&self) -> &dyn ConsoleSink {
        self.inner.console.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Run `f` against the state
    ///
    /// Fails once the adapter is destroyed, and when the state is already
    /// borrowed further up the call stack.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut AdapterState) -> R) -> Result<R, Fault> {
        let mut state = self
            .inner
            .state
            .try_borrow_mut()
            .map_err(|_| Fault::Trap("adapter state is busy".to_string()))?;
        if state.destroyed {
            return Err(Fault::Trap("adapter destroyed".to_string()));
        }
        Ok(f(&mut state))
    }

    /// Read-only view of the state, for inspection by the embedder
    pub fn state(&self) -> Ref<'_, AdapterState> {
        self.inner.state.borrow()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().destroyed
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.inner.state.borrow().exit_status
    }

    pub fn root_context(&self) -> u32 {
        self.inner.state.borrow().root
    }

    pub fn table(&self) -> IndirectCallTable<'_> {
        IndirectCallTable::new(self)
    }

    pub fn libc(&self) -> Libc<'_> {
        Libc::new(self)
    }

    pub fn sapi(&self) -> Sapi<'_> {
        Sapi::new(self)
    }

    pub fn read_cstring(&self, ptr: u32) -> Result<Option<String>, Fault> {
        self.with_state(|state| state.read_cstring(ptr))?
    }

    pub fn read_bytes(&self, ptr: u32, len: u32) -> Result<Vec<u8>, Fault> {
        Ok(self.with_state(|state| state.memory.read(ptr, len))??)
    }

    pub fn push(&self, value: StackValue<'_>) -> Result<u32, Fault> {
        self.with_state(|state| state.push(value))?
    }

    /// Push an optional string, `NULL` for `None`
    pub fn push_str(&self, value: Option<&str>) -> Result<u32, Fault> {
        match value {
            Some(s) => self.push(StackValue::Str(s)),
            None => Ok(NULL),
        }
    }

    /// Set up the stack and heap, run constructors and the initializer
    ///
    /// Returns the initializer's verdict. The adapter is unusable until this
    /// has succeeded.
    pub fn init(&self) -> Result<bool, Fault> {
        let instance = self.instance()?;
        let layout = ModuleLayout::resolve(|name| instance.global(name))
            .ok_or_else(|| Fault::Trap("module does not export its memory layout".to_string()))?;

        self.with_state(|state| -> Result<(), Fault> {
            instance.initialize_memory(&mut state.memory)?;
            let limit = layout.heap_limit(state.memory.size());
            state.stack = Stack::new(layout.stack_low, layout.stack_high);
            state.heap = Heap::new(layout.heap_base, limit);
            state.layout = layout;
            Ok(())
        })??;

        self.table().call_export(exports::CALL_CTORS, &[])?;

        let root = self.with_state(|state| {
            let policies = state.policies.take().unwrap_or_default();
            let root = state
                .contexts
                .create(&mut state.heap, None, true, Some(policies));
            state.root = root;
            root
        })?;
        if root == NULL {
            return Err(Fault::Trap("out of memory creating the root context".to_string()));
        }

        self.with_state(|state| {
            state
                .libc
                .preallocate_error_messages(&mut state.heap, &mut state.memory)
        })??;

        let entry = self
            .table()
            .call_export(exports::INITIALIZER, &[])?
            .and_then(|v| v.as_u32())
            .unwrap_or(NULL);
        if entry == NULL {
            log::warn!("extension initializer returned no entry point");
            return Ok(false);
        }

        let verdict = self.table().call(entry, &[Argument::Ptr(root)])?;
        Ok(verdict.is_some_and(|v| v.is_truthy()))
    }

    /// Metadata strings from the module's exports
    pub fn info(&self) -> Result<ExtensionInfo, Fault> {
        let instance = self.instance()?;
        let call = |name: &str| -> Result<u32, Fault> {
            Ok(instance
                .call_export(self, name, &[])?
                .and_then(|v| v.as_u32())
                .unwrap_or(NULL))
        };
        let abi = call(exports::ABI)?;
        let name = call(exports::NAME)?;
        let version = call(exports::VERSION)?;
        let description = call(exports::DESCRIPTION)?;

        Ok(ExtensionInfo {
            abi,
            name: self.read_cstring(name)?.unwrap_or_default(),
            version: self.read_cstring(version)?.unwrap_or_default(),
            description: self.read_cstring(description)?.unwrap_or_default(),
        })
    }

    /// Hand a fault raised inside a JS import back to the caller of the
    /// module function that unwound
    pub fn record_fault(&self, fault: Fault) {
        if let Ok(mut state) = self.inner.state.try_borrow_mut() {
            state.pending_fault.get_or_insert(fault);
        }
    }

    pub fn take_fault(&self) -> Option<Fault> {
        self.inner
            .state
            .try_borrow_mut()
            .ok()
            .and_then(|mut state| state.pending_fault.take())
    }

    /// Host entry boundary: a fault tears the adapter down
    pub fn guard<T>(&self, result: Result<T, Fault>) -> ExtensionResult<T> {
        result.map_err(|fault| {
            self.terminate(&fault);
            ExtensionError::Fault(fault)
        })
    }

    /// Record the exit status a fault implies and destroy the adapter
    pub fn terminate(&self, fault: &Fault) {
        match fault {
            Fault::Trap(reason) => log::error!("extension trapped: {reason}"),
            other => log::debug!("extension terminated: {other}"),
        }
        if let Ok(mut state) = self.inner.state.try_borrow_mut() {
            if state.exit_status.is_none() {
                state.exit_status = fault.exit_status();
            }
        }
        self.destroy();
    }

    /// Release every resource; idempotent
    pub fn destroy(&self) {
        let Ok(mut state) = self.inner.state.try_borrow_mut() else {
            log::error!("adapter destroyed while its state was borrowed");
            return;
        };
        if state.destroyed {
            return;
        }

        let pending = state.libc.drain_streams();
        state.references.clear();
        state.contexts.clear();
        state.router.clear();
        state.libc.reset();
        state.heap.reset();
        state.stack.reset();
        state.root = NULL;
        state.destroyed = true;
        drop(state);

        for (stream, line) in pending {
            self.console().write_line(stream, &line);
        }
    }

    /// Route a host request through the root context
    ///
    /// `on_reply` runs once, when a handler replies. Returns whether a route
    /// matched.
    pub fn request(
        &self,
        uri: &str,
        bytes: Option<Vec<u8>>,
        on_reply: impl FnOnce(Reply) + 'static,
    ) -> ExtensionResult<bool> {
        if self.is_destroyed() {
            return Err(ExtensionError::Destroyed);
        }
        let root = self.root_context();
        let result = self.invoke(root, uri, bytes, Responder::Host(Box::new(on_reply)));
        self.guard(result)
    }

    /// Call a module export from the host side
    pub fn call_export(&self, name: &str, args: &[Value]) -> ExtensionResult<Option<Value>> {
        if self.is_destroyed() {
            return Err(ExtensionError::Destroyed);
        }
        let result = self.table().call_export(name, args);
        self.guard(result)
    }

    /// Drive deferred dispatches and pending bus responses
    pub fn run_until_stalled(&self) -> usize {
        self.scheduler().run_until_stalled()
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.try_borrow();
        let mut debug = f.debug_struct("Adapter");
        if let Ok(state) = state {
            debug
                .field("root", &state.root)
                .field("contexts", &state.contexts.len())
                .field("references", &state.references.len())
                .field("destroyed", &state.destroyed)
                .field("exit_status", &state.exit_status);
        }
        debug.finish_non_exhaustive()
    }
}

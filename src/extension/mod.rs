//! Sandboxed Extension Bridge
//!
//! An extension is a WebAssembly module compiled without WASI. It expects a
//! C runtime and direct access to the host's request bus, and this module
//! provides both from the host side: a stack and heap over the module's
//! linear memory, a table of host values addressed by integer handles, a
//! small C library, and the `sapi_*` family for contexts, structured values
//! and IPC.
//!
//! # ABI v1
//!
//! ## Required Exports
//!
//! | Export                          | Kind     | Description                          |
//! |---------------------------------|----------|--------------------------------------|
//! | `__sapi_extension_initializer`  | Function | Returns the table index of the entry |
//! | `__sapi_extension_abi`          | Function | ABI version (1)                      |
//! | `__sapi_extension_name`         | Function | Pointer to the name string           |
//! | `__sapi_extension_version`      | Function | Pointer to the version string        |
//! | `__sapi_extension_description`  | Function | Pointer to the description string    |
//! | `__wasm_call_ctors`             | Function | Static constructors                  |
//! | `__indirect_function_table`     | Table    | Callbacks, addressed by index        |
//! | `__stack_low` `__stack_high`    | Global   | Argument stack bounds                |
//! | `__heap_base` `__heap_end`      | Global   | Heap bounds; end 0 means memory end  |
//! | `__global_base`                 | Global   | Start of static data                 |
//!
//! Memory is not exported. The module imports it as `env.memory`.
//!
//! ## Imports
//!
//! Everything in the `env` namespace: the C library functions (`malloc`,
//! `printf`, `strtol`, `regcomp`, ...) and the `sapi_*` functions.
//!
//! ## Calling Convention
//!
//! ```text
//! i32   address, handle or scalar
//! f64   double
//! i64   64-bit integers, BigInt in the browser
//! ptr   NUL-terminated string, or bytes with an explicit size argument
//! ```
//!
//! Strings handed to the module are pushed on the argument stack and stay
//! valid until the host call that produced them returns to its caller.
//!
//! ## Lifecycle
//!
//! ```text
//! load ──► validate ──► instantiate ──► init ──► running ──► destroyed
//!                                        │          │
//!                                        └── exit/abort/trap ──┘
//! ```
//!
//! `init` derives the stack and heap from the layout globals, runs
//! `__wasm_call_ctors`, creates the root context with the load-time
//! policies, and calls the entry returned by the initializer with the root
//! context handle. An entry returning 0 fails the load.
//!
//! ## Contexts and Policies
//!
//! Every allocation a module makes through a `sapi_*` call belongs to an
//! execution context. Releasing a context frees its pool, its handles and
//! its children. Policies are consulted by progressively dropping
//! `_`-separated suffixes, so an `ipc` policy decides `ipc_router_map`
//! unless `ipc_router` or `ipc_router_map` is registered too. A name with no
//! registered prefix is denied.

pub mod abi;
pub mod adapter;
pub mod binding;
pub mod context;
pub mod error;
#[cfg(target_arch = "wasm32")]
pub mod imports;
pub mod instance;
pub mod json;
pub mod libc;
pub mod loader;
pub mod memory;
pub mod reference;
pub mod registry;
pub mod sapi;
pub mod table;

pub use adapter::{Adapter, AdapterOptions, AdapterState, ExtensionInfo, WeakAdapter};
pub use binding::{Binding, BindingOptions, RequestDescriptor, Verb};
pub use context::{ContextTree, ExecutionContext, Lifecycle, PolicySet};
pub use error::{ExtensionError, ExtensionResult, Fault, LoadError, LoadStage, MemoryError, ModuleError};
pub use instance::{ModuleInstance, NativeModule, NativeModuleBuilder, Value};
pub use loader::{Extension, ExtensionKind, ExtensionStats, LoadOptions, Loader, ModuleValidator};
pub use memory::{Heap, LinearMemory, Stack, StackValue};
pub use reference::{HostValue, ReferenceTable};
pub use registry::ExtensionRegistry;
pub use table::{Argument, IndirectCallTable};

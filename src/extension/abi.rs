//! Extension ABI types and constants
//!
//! This module defines the stable interface between the bridge and a
//! sandboxed extension module: export names, layout globals, JSON type tags
//! and the `#[repr(C)]` structs written into linear memory.

use bytemuck::{Pod, Zeroable};

/// ABI version understood by this bridge
pub const ABI_VERSION: u32 = 1;

/// The absent address
pub const NULL: u32 = 0;

/// Size of a sandbox pointer in bytes
pub const POINTER_SIZE: u32 = 4;

/// Bytes in one WebAssembly page
pub const PAGE_SIZE: u32 = 65536;

/// Import module namespace
pub const IMPORT_NAMESPACE: &str = "env";

/// Required export names
pub mod exports {
    pub const INITIALIZER: &str = "__sapi_extension_initializer";
    pub const ABI: &str = "__sapi_extension_abi";
    pub const NAME: &str = "__sapi_extension_name";
    pub const VERSION: &str = "__sapi_extension_version";
    pub const DESCRIPTION: &str = "__sapi_extension_description";
    pub const CALL_CTORS: &str = "__wasm_call_ctors";
    pub const TABLE: &str = "__indirect_function_table";

    /// Function exports every extension must provide
    pub const FUNCTIONS: [&str; 6] = [INITIALIZER, ABI, NAME, VERSION, DESCRIPTION, CALL_CTORS];
}

/// Layout globals exported by the module linker
pub mod globals {
    pub const STACK_LOW: &str = "__stack_low";
    pub const STACK_HIGH: &str = "__stack_high";
    pub const HEAP_BASE: &str = "__heap_base";
    pub const HEAP_END: &str = "__heap_end";
    pub const GLOBAL_BASE: &str = "__global_base";

    pub const ALL: [&str; 5] = [STACK_LOW, STACK_HIGH, HEAP_BASE, HEAP_END, GLOBAL_BASE];
}

/// Export kinds as encoded in the export section
pub mod export_kind {
    pub const FUNCTION: u8 = 0;
    pub const TABLE: u8 = 1;
    pub const MEMORY: u8 = 2;
    pub const GLOBAL: u8 = 3;
}

/// Standard stream descriptors
pub mod fd {
    pub const STDIN: i32 = 0;
    pub const STDOUT: i32 = 1;
    pub const STDERR: i32 = 2;
}

/// Tags returned by `sapi_json_typeof`
pub mod json_type {
    pub const EMPTY: i32 = -1;
    pub const ANY: i32 = 0;
    pub const NULL: i32 = 1;
    pub const OBJECT: i32 = 2;
    pub const ARRAY: i32 = 3;
    pub const BOOLEAN: i32 = 4;
    pub const NUMBER: i32 = 5;
    pub const STRING: i32 = 6;
    pub const RAW: i32 = 7;
}

/// Memory regions declared by the module's layout globals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleLayout {
    pub stack_low: u32,
    pub stack_high: u32,
    pub heap_base: u32,
    pub heap_end: u32,
    pub global_base: u32,
}

impl ModuleLayout {
    /// Build a layout from a global lookup, `None` if any global is missing
    pub fn resolve(mut lookup: impl FnMut(&str) -> Option<u32>) -> Option<Self> {
        Some(Self {
            stack_low: lookup(globals::STACK_LOW)?,
            stack_high: lookup(globals::STACK_HIGH)?,
            heap_base: lookup(globals::HEAP_BASE)?,
            heap_end: lookup(globals::HEAP_END)?,
            global_base: lookup(globals::GLOBAL_BASE)?,
        })
    }

    /// Heap end, or the end of memory when the linker left it unset
    pub fn heap_limit(&self, memory_size: u32) -> u32 {
        if self.heap_end > self.heap_base {
            self.heap_end.min(memory_size)
        } else {
            memory_size
        }
    }
}

/// `div_t` as laid out by a 32-bit C target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct DivT {
    pub quot: i32,
    pub rem: i32,
}

/// `lldiv_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct LLDivT {
    pub quot: i64,
    pub rem: i64,
}

/// `regmatch_t` with 32-bit offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct RegMatch {
    pub rm_so: i32,
    pub rm_eo: i32,
}

impl RegMatch {
    /// Marker for an unmatched group
    pub const UNSET: RegMatch = RegMatch { rm_so: -1, rm_eo: -1 };
}

//! Native module instances
//!
//! A `NativeModule` stands in for a compiled sandbox module when the bridge
//! runs outside a browser. Its exports and function table are Rust closures
//! that receive the adapter and talk to it through the same `Libc` and `Sapi`
//! surface a real module imports. Static strings live in data segments that
//! are copied into linear memory before constructors run.

use super::{ModuleInstance, Value};
use crate::extension::abi::{ABI_VERSION, exports, globals};
use crate::extension::adapter::Adapter;
use crate::extension::error::{Fault, MemoryError};
use crate::extension::memory::LinearMemory;
use std::collections::HashMap;
use std::rc::Rc;

/// A function in a native module's table or export list
pub type NativeFn = Rc<dyn Fn(&Adapter, &[Value]) -> Result<Option<Value>, Fault>>;

const DEFAULT_GLOBAL_BASE: u32 = 1024;
const DEFAULT_STACK_LOW: u32 = 16 * 1024;
const DEFAULT_STACK_HIGH: u32 = 32 * 1024;
const DEFAULT_HEAP_BASE: u32 = 32 * 1024;

pub struct NativeModule {
    exports: HashMap<String, NativeFn>,
    globals: HashMap<String, u32>,
    table: Vec<Option<NativeFn>>,
    data: Vec<(u32, Vec<u8>)>,
}

impl NativeModule {
    pub fn builder() -> NativeModuleBuilder {
        NativeModuleBuilder::new()
    }
}

impl ModuleInstance for NativeModule {
    fn global(&self, name: &str) -> Option<u32> {
        self.globals.get(name).copied()
    }

    fn has_export(&self, name: &str) -> bool {
        self.exports.contains_key(name)
            || self.globals.contains_key(name)
            || name == exports::TABLE
    }

    fn call_export(
        &self,
        adapter: &Adapter,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>, Fault> {
        let function = self
            .exports
            .get(name)
            .ok_or_else(|| Fault::Trap(format!("missing export '{name}'")))?;
        function(adapter, args)
    }

    fn table_len(&self) -> u32 {
        self.table.len() as u32
    }

    fn call_indirect(
        &self,
        adapter: &Adapter,
        index: u32,
        args: &[Value],
    ) -> Result<Option<Value>, Fault> {
        match self.table.get(index as usize) {
            Some(Some(function)) => function(adapter, args),
            _ => Ok(None),
        }
    }

    fn initialize_memory(&self, memory: &mut LinearMemory) -> Result<(), MemoryError> {
        for (address, bytes) in &self.data {
            memory.write(*address, bytes)?;
        }
        Ok(())
    }
}

/// Assembles a `NativeModule`
///
/// Table slot 0 is reserved so that index 0 stays the null function, as in
/// a linked module.
pub struct NativeModuleBuilder {
    exports: HashMap<String, NativeFn>,
    globals: HashMap<String, u32>,
    table: Vec<Option<NativeFn>>,
    data: Vec<(u32, Vec<u8>)>,
    data_end: u32,
}

impl Default for NativeModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeModuleBuilder {
    pub fn new() -> Self {
        let mut globals = HashMap::new();
        globals.insert(globals::GLOBAL_BASE.to_string(), DEFAULT_GLOBAL_BASE);
        globals.insert(globals::STACK_LOW.to_string(), DEFAULT_STACK_LOW);
        globals.insert(globals::STACK_HIGH.to_string(), DEFAULT_STACK_HIGH);
        globals.insert(globals::HEAP_BASE.to_string(), DEFAULT_HEAP_BASE);
        globals.insert(globals::HEAP_END.to_string(), 0);

        Self {
            exports: HashMap::new(),
            globals,
            table: vec![None],
            data: Vec::new(),
            data_end: DEFAULT_GLOBAL_BASE,
        }
    }

    /// Add a function to the table, returning its index
    pub fn function(
        &mut self,
        f: impl Fn(&Adapter, &[Value]) -> Result<Option<Value>, Fault> + 'static,
    ) -> u32 {
        self.table.push(Some(Rc::new(f)));
        (self.table.len() - 1) as u32
    }

    pub fn export(
        &mut self,
        name: &str,
        f: impl Fn(&Adapter, &[Value]) -> Result<Option<Value>, Fault> + 'static,
    ) -> &mut Self {
        self.exports.insert(name.to_string(), Rc::new(f));
        self
    }

    /// Drop an export or global, for building broken modules
    pub fn remove_export(&mut self, name: &str) -> &mut Self {
        self.exports.remove(name);
        self.globals.remove(name);
        self
    }

    pub fn global(&mut self, name: &str, value: u32) -> &mut Self {
        self.globals.insert(name.to_string(), value);
        self
    }

    /// Place bytes in the static data area, returning their address
    pub fn data(&mut self, bytes: &[u8]) -> u32 {
        let address = self.data_end;
        self.data.push((address, bytes.to_vec()));
        self.data_end = (address + bytes.len() as u32 + 7) & !7;
        address
    }

    /// Place a NUL-terminated string in the static data area
    pub fn string(&mut self, value: &str) -> u32 {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.data(&bytes)
    }

    /// Export the ABI version and metadata strings
    pub fn metadata(&mut self, name: &str, version: &str, description: &str) -> &mut Self {
        let name = self.string(name);
        let version = self.string(version);
        let description = self.string(description);

        self.export(exports::ABI, |_, _| Ok(Some(Value::from(ABI_VERSION))));
        self.export(exports::NAME, move |_, _| Ok(Some(Value::from(name))));
        self.export(exports::VERSION, move |_, _| Ok(Some(Value::from(version))));
        self.export(exports::DESCRIPTION, move |_, _| {
            Ok(Some(Value::from(description)))
        })
    }

    /// Static constructors, run by `__wasm_call_ctors`
    pub fn ctors(&mut self, f: impl Fn(&Adapter) -> Result<(), Fault> + 'static) -> &mut Self {
        self.export(exports::CALL_CTORS, move |adapter, _| {
            f(adapter)?;
            Ok(None)
        })
    }

    /// The entry point, called with the root context handle
    ///
    /// Returning `false` fails the load.
    pub fn initializer(
        &mut self,
        f: impl Fn(&Adapter, u32) -> Result<bool, Fault> + 'static,
    ) -> &mut Self {
        let index = self.function(move |adapter, args| {
            let context = args.first().and_then(Value::as_u32).unwrap_or(0);
            f(adapter, context).map(|ok| Some(Value::from(ok)))
        });
        self.export(exports::INITIALIZER, move |_, _| Ok(Some(Value::from(index))))
    }

    /// Stack and heap bounds
    pub fn layout(&mut self, stack_low: u32, stack_high: u32, heap_base: u32, heap_end: u32) -> &mut Self {
        self.global(globals::STACK_LOW, stack_low);
        self.global(globals::STACK_HIGH, stack_high);
        self.global(globals::HEAP_BASE, heap_base);
        self.global(globals::HEAP_END, heap_end)
    }

    pub fn build(&mut self) -> NativeModule {
        if !self.exports.contains_key(exports::CALL_CTORS) {
            self.ctors(|_| Ok(()));
        }
        NativeModule {
            exports: std::mem::take(&mut self.exports),
            globals: std::mem::take(&mut self.globals),
            table: std::mem::take(&mut self.table),
            data: std::mem::take(&mut self.data),
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn test_table_reserves_null_slot() {
        let mut builder = NativeModule::builder();
        let first = builder.function(|_, _| Ok(Some(Value::I32(7))));
        assert_eq!(first, 1);
        let module = builder.build();
        assert_eq!(module.table_len(), 2);
        assert!(module.has_export(exports::CALL_CTORS));
        assert!(module.has_export(globals::HEAP_BASE));
    }

    #[test]
    fn test_data_segments_are_aligned() {
        let mut builder = NativeModule::builder();
        let a = builder.string("abc");
        let b = builder.string("d");
        assert_eq!(a, DEFAULT_GLOBAL_BASE);
        assert_eq!(b, DEFAULT_GLOBAL_BASE + 8);

        let module = builder.build();
        let mut memory = LinearMemory::new(1);
        module.initialize_memory(&mut memory).unwrap();
        assert_eq!(memory.read_cstring(a).unwrap().as_deref(), Some("abc"));
        assert_eq!(memory.read_cstring(b).unwrap().as_deref(), Some("d"));
    }

    #[test]
    fn test_remove_export() {
        let mut builder = NativeModule::builder();
        builder.metadata("m", "1.0.0", "");
        builder.remove_export(exports::NAME).remove_export(globals::STACK_LOW);
        let module = builder.build();
        assert!(!module.has_export(exports::NAME));
        assert!(module.has_export(exports::VERSION));
        assert_eq!(module.global(globals::STACK_LOW), None);
    }
}

//! Module instances
//!
//! `ModuleInstance` is the seam between the bridge and whatever actually
//! executes extension code. In the browser that is a `WebAssembly.Instance`;
//! natively it is a `NativeModule` whose exports and function table are Rust
//! closures calling back into the same import surface.

mod native;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use native::{NativeFn, NativeModule, NativeModuleBuilder};

use super::adapter::Adapter;
use super::error::{Fault, MemoryError};
use super::memory::LinearMemory;

/// A value crossing the module boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F64(f64),
}

impl Value {
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::I32(v) => Some(v),
            Value::I64(v) => i32::try_from(v).ok(),
            Value::F64(_) => None,
        }
    }

    /// Address or handle carried in an `i32`
    pub fn as_u32(&self) -> Option<u32> {
        self.as_i32().map(|v| v as u32)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::I32(v) => Some(v as f64),
            Value::I64(v) => Some(v as f64),
            Value::F64(v) => Some(v),
        }
    }

    /// C truthiness
    pub fn is_truthy(&self) -> bool {
        match *self {
            Value::I32(v) => v != 0,
            Value::I64(v) => v != 0,
            Value::F64(v) => v != 0.0,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::I32(v as i32)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::I32(v as i32)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

/// Something that runs extension code
pub trait ModuleInstance {
    /// Value of an exported `i32` global
    fn global(&self, name: &str) -> Option<u32>;

    fn has_export(&self, name: &str) -> bool;

    fn call_export(&self, adapter: &Adapter, name: &str, args: &[Value])
    -> Result<Option<Value>, Fault>;

    /// Number of slots in the indirect function table
    fn table_len(&self) -> u32;

    /// Call a table slot; an empty slot yields `None`
    fn call_indirect(
        &self,
        adapter: &Adapter,
        index: u32,
        args: &[Value],
    ) -> Result<Option<Value>, Fault>;

    /// Copy static data into memory before constructors run
    fn initialize_memory(&self, _memory: &mut LinearMemory) -> Result<(), MemoryError> {
        Ok(())
    }
}

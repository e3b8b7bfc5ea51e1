//! Indirect function table calls
//!
//! Strings and byte buffers are marshalled onto the argument stack before
//! the call. A `StackFrame` guard rewinds the stack when the call returns,
//! whether it succeeded or faulted, so nested and re-entrant calls stay
//! balanced. Host calls of named exports get the same guard.

use super::adapter::Adapter;
use super::error::Fault;
use super::instance::Value;
use super::memory::StackValue;

/// An argument to a table call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument<'a> {
    I32(i32),
    /// Address or handle
    Ptr(u32),
    F64(f64),
    /// Pushed as a NUL-terminated string; the callee gets its address
    Str(&'a str),
    /// Pushed as raw bytes; the callee gets their address
    Bytes(&'a [u8]),
}

/// The module's `__indirect_function_table`
pub struct IndirectCallTable<'a> {
    adapter: &'a Adapter,
}

impl<'a> IndirectCallTable<'a> {
    pub(crate) fn new(adapter: &'a Adapter) -> Self {
        Self { adapter }
    }

    pub fn len(&self) -> u32 {
        self.adapter
            .instance()
            .map(|instance| instance.table_len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call the function at `index`
    ///
    /// Out-of-range indices and empty slots return `Ok(None)` without
    /// touching the stack.
    pub fn call(&self, index: u32, args: &[Argument<'_>]) -> Result<Option<Value>, Fault> {
        let instance = self.adapter.instance()?;
        if index >= instance.table_len() {
            return Ok(None);
        }

        let frame = StackFrame::enter(self.adapter)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = match *arg {
                Argument::I32(v) => Value::I32(v),
                Argument::Ptr(p) => Value::from(p),
                Argument::F64(v) => Value::F64(v),
                Argument::Str(s) => Value::from(self.adapter.push(StackValue::Str(s))?),
                Argument::Bytes(b) => Value::from(self.adapter.push(StackValue::Bytes(b))?),
            };
            values.push(value);
        }

        let result = instance.call_indirect(self.adapter, index, &values);
        drop(frame);
        result
    }

    /// Call a named export, rewinding whatever its imports pushed
    pub fn call_export(&self, name: &str, args: &[Value]) -> Result<Option<Value>, Fault> {
        let instance = self.adapter.instance()?;
        let frame = StackFrame::enter(self.adapter)?;
        let result = instance.call_export(self.adapter, name, args);
        drop(frame);
        result
    }
}

/// Restores the stack to the mark taken on entry
struct StackFrame<'a> {
    adapter: &'a Adapter,
    mark: u32,
}

impl<'a> StackFrame<'a> {
    fn enter(adapter: &'a Adapter) -> Result<Self, Fault> {
        let mark = adapter.with_state(|state| state.stack.mark())?;
        Ok(Self { adapter, mark })
    }
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        let mark = self.mark;
        // a destroyed adapter has already reset its stack
        let _ = self.adapter.with_state(|state| state.stack.restore(mark));
    }
}

//! Foreign reference table
//!
//! Host values the module cannot hold directly are parked here, keyed by a
//! 4-byte heap allocation that doubles as the module-visible handle.

use super::abi::NULL;
use super::json::JsonRef;
use crate::ipc::message::Message;
use crate::ipc::result::ResultRef;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A host value addressable by handle
#[derive(Debug, Clone)]
pub enum HostValue {
    Json(JsonRef),
    Message(Rc<Message>),
    Result(ResultRef),
}

impl HostValue {
    /// Identity comparison
    pub fn same(&self, other: &HostValue) -> bool {
        match (self, other) {
            (HostValue::Json(a), HostValue::Json(b)) => Rc::ptr_eq(a, b),
            (HostValue::Message(a), HostValue::Message(b)) => Rc::ptr_eq(a, b),
            (HostValue::Result(a), HostValue::Result(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: BTreeMap<u32, HostValue>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind `value` to an already allocated handle
    pub fn insert(&mut self, handle: u32, value: HostValue) {
        if handle != NULL {
            self.entries.insert(handle, value);
        }
    }

    pub fn get(&self, handle: u32) -> Option<&HostValue> {
        self.entries.get(&handle)
    }

    pub fn contains(&self, handle: u32) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn json(&self, handle: u32) -> Option<JsonRef> {
        match self.entries.get(&handle)? {
            HostValue::Json(value) => Some(Rc::clone(value)),
            _ => None,
        }
    }

    pub fn message(&self, handle: u32) -> Option<Rc<Message>> {
        match self.entries.get(&handle)? {
            HostValue::Message(value) => Some(Rc::clone(value)),
            _ => None,
        }
    }

    pub fn result(&self, handle: u32) -> Option<ResultRef> {
        match self.entries.get(&handle)? {
            HostValue::Result(value) => Some(Rc::clone(value)),
            _ => None,
        }
    }

    /// Handle already bound to this exact value, or `NULL`
    pub fn reverse_lookup(&self, value: &HostValue) -> u32 {
        self.entries
            .iter()
            .find(|(_, v)| v.same(value))
            .map(|(handle, _)| *handle)
            .unwrap_or(NULL)
    }

    pub fn remove(&mut self, handle: u32) -> Option<HostValue> {
        self.entries.remove(&handle)
    }

    /// Remove a handle; a pending result behind it is abandoned
    pub fn release(&mut self, handle: u32) -> bool {
        match self.entries.remove(&handle) {
            Some(HostValue::Result(result)) => {
                result.borrow_mut().abandon();
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn clear(&mut self) {
        let handles: Vec<u32> = self.entries.keys().copied().collect();
        for handle in handles {
            self.release(handle);
        }
    }
}

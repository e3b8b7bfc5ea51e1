//! The `sapi_*` import family
//!
//! Everything a module does beyond plain C goes through here: contexts,
//! structured values, IPC messages and results, routing, and events. Values
//! cross the boundary as handles; strings handed back to the module are
//! pushed onto the argument stack and live until the enclosing call returns.
//!
//! Routing, dispatch, invoke, emit and send are gated on the calling
//! context's policies. A denied call is logged at debug level and returns
//! its failure value.

use super::abi::{NULL, fd, json_type};
use super::adapter::{Adapter, AdapterState};
use super::error::Fault;
use super::json::{self, JsonNode, JsonRef};
use super::reference::HostValue;
use super::table::Argument;
use crate::ipc::bus::DEFAULT_EVENT;
use crate::ipc::message::Message;
use crate::ipc::result::{IpcResult, ResultRef, Responder};
use crate::ipc::router::Handler;
use serde_json::{Value, json};
use std::rc::Rc;

/// Borrowed view of an adapter exposing the `sapi_*` surface
pub struct Sapi<'a> {
    adapter: &'a Adapter,
}

impl<'a> Sapi<'a> {
    pub(crate) fn new(adapter: &'a Adapter) -> Self {
        Self { adapter }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut AdapterState) -> R) -> Result<R, Fault> {
        self.adapter.with_state(f)
    }

    fn string(&self, ptr: u32) -> Result<Option<String>, Fault> {
        self.adapter.read_cstring(ptr)
    }

    fn push_str(&self, value: Option<&str>) -> Result<u32, Fault> {
        self.adapter.push_str(value)
    }

    /// Check `name` against the policies of `ctx`
    fn allowed(&self, ctx: u32, name: &str) -> Result<bool, Fault> {
        let allowed = self.with_state(|state| state.contexts.is_allowed(ctx, name))?;
        if !allowed {
            log::debug!("'{name}' is not allowed in context {ctx:#x}");
        }
        Ok(allowed)
    }

    fn json(&self, handle: u32) -> Result<Option<JsonRef>, Fault> {
        self.with_state(|state| state.references.json(handle))
    }

    fn message(&self, handle: u32) -> Result<Option<Rc<Message>>, Fault> {
        self.with_state(|state| state.references.message(handle))
    }

    fn result(&self, handle: u32) -> Result<Option<ResultRef>, Fault> {
        self.with_state(|state| state.references.result(handle))
    }

    /// Handle for `node`, reusing an existing one; new handles belong to
    /// whichever context owns `related`, or the root
    fn json_handle(&self, related: u32, node: JsonRef) -> Result<u32, Fault> {
        self.with_state(|state| {
            let owner = state.owner_of(related).unwrap_or_else(|| state.root());
            state.find_or_create_reference(owner, HostValue::Json(node))
        })
    }

    /// Copy `bytes` into a block owned by `ctx`
    fn copy_bytes(&self, ctx: u32, bytes: &[u8]) -> Result<u32, Fault> {
        if bytes.is_empty() {
            return Ok(NULL);
        }
        self.with_state(|state| -> Result<u32, Fault> {
            let ptr = state.context_alloc(ctx, bytes.len() as u32);
            if ptr != NULL {
                state.memory.write(ptr, bytes)?;
            }
            Ok(ptr)
        })?
    }

    // ------------------------------------------------------------------
    // Logging

    pub fn log(&self, _ctx: u32, message: u32) -> Result<(), Fault> {
        if let Some(message) = self.string(message)? {
            self.adapter.console().write_line(fd::STDOUT, &message);
        }
        Ok(())
    }

    pub fn debug(&self, ctx: u32, message: u32) -> Result<(), Fault> {
        if let Some(message) = self.string(message)? {
            log::debug!("[{ctx:#x}] {message}");
        }
        Ok(())
    }

    pub fn rand64(&self) -> u64 {
        random_u64()
    }

    // ------------------------------------------------------------------
    // Extensions

    pub fn extension_is_allowed(&self, ctx: u32, names: u32) -> Result<bool, Fault> {
        let Some(names) = self.string(names)? else {
            return Ok(false);
        };
        self.with_state(|state| state.contexts.is_allowed(ctx, &names))
    }

    pub fn extension_register(&self, _registration: u32) -> Result<bool, Fault> {
        log::warn!("sapi_extension_register: Operation is not supported");
        Ok(false)
    }

    pub fn extension_load(&self, _ctx: u32, _name: u32, _data: u32) -> Result<bool, Fault> {
        log::warn!("sapi_extension_load: Operation is not supported");
        Ok(false)
    }

    pub fn extension_unload(&self, _ctx: u32, _name: u32) -> Result<bool, Fault> {
        log::warn!("sapi_extension_unload: Operation is not supported");
        Ok(false)
    }

    pub fn extension_get(&self, _ctx: u32, _name: u32) -> Result<u32, Fault> {
        log::warn!("sapi_extension_get: Operation is not supported");
        Ok(NULL)
    }

    // ------------------------------------------------------------------
    // Contexts

    /// New child of `parent`, or of the root when `parent` is NULL
    pub fn context_create(&self, parent: u32, retained: bool) -> Result<u32, Fault> {
        self.with_state(|state| {
            let parent = if parent == NULL { state.root() } else { parent };
            if !state.contexts.contains(parent) {
                return NULL;
            }
            state.create_context(Some(parent), retained)
        })
    }

    pub fn context_retain(&self, ctx: u32) -> Result<(), Fault> {
        self.with_state(|state| {
            state.contexts.retain(ctx);
        })
    }

    pub fn context_retained(&self, ctx: u32) -> Result<bool, Fault> {
        self.with_state(|state| state.contexts.get(ctx).is_some_and(|c| c.is_retained()))
    }

    pub fn context_release(&self, ctx: u32) -> Result<(), Fault> {
        self.with_state(|state| {
            state.release_context(ctx);
        })
    }

    pub fn context_set_data(&self, ctx: u32, data: u32) -> Result<bool, Fault> {
        self.with_state(|state| match state.contexts.get_mut(ctx) {
            Some(context) => {
                context.data = data;
                true
            }
            None => false,
        })
    }

    pub fn context_get_data(&self, ctx: u32) -> Result<u32, Fault> {
        self.with_state(|state| state.contexts.get(ctx).map(|c| c.data).unwrap_or(NULL))
    }

    /// Call `callback(ctx, data)` on a later turn
    ///
    /// The context is retained until the callback has run.
    pub fn context_dispatch(&self, ctx: u32, data: u32, callback: u32) -> Result<bool, Fault> {
        if !self.allowed(ctx, "context_dispatch")? {
            return Ok(false);
        }
        if !self.with_state(|state| state.contexts.retain(ctx))? {
            return Ok(false);
        }

        let weak = self.adapter.downgrade();
        self.adapter.scheduler().defer(move || {
            let Some(adapter) = weak.upgrade() else {
                return;
            };
            if adapter.is_destroyed() {
                return;
            }
            let outcome = adapter
                .table()
                .call(callback, &[Argument::Ptr(ctx), Argument::Ptr(data)])
                .and_then(|_| adapter.with_state(|state| state.release_context(ctx)));
            let _ = adapter.guard(outcome);
        });
        Ok(true)
    }

    pub fn context_alloc(&self, ctx: u32, size: u32) -> Result<u32, Fault> {
        self.with_state(|state| state.context_alloc(ctx, size))
    }

    pub fn context_get_parent(&self, ctx: u32) -> Result<u32, Fault> {
        self.with_state(|state| {
            state
                .contexts
                .get(ctx)
                .and_then(|c| c.parent())
                .unwrap_or(NULL)
        })
    }

    pub fn context_get_loop(&self, _ctx: u32) -> Result<u32, Fault> {
        log::warn!("sapi_context_get_loop: Operation is not supported");
        Ok(NULL)
    }

    pub fn context_error_set_code(&self, ctx: u32, code: i32) -> Result<(), Fault> {
        self.with_state(|state| {
            if let Some(context) = state.contexts.get_mut(ctx) {
                context.error_mut().code = code;
            }
        })
    }

    pub fn context_error_get_code(&self, ctx: u32) -> Result<i32, Fault> {
        self.with_state(|state| {
            state
                .contexts
                .get(ctx)
                .and_then(|c| c.error.as_ref())
                .map(|e| e.code)
                .unwrap_or(0)
        })
    }

    pub fn context_error_set_name(&self, ctx: u32, name: u32) -> Result<(), Fault> {
        let name = self.string(name)?;
        self.with_state(|state| {
            if let Some(context) = state.contexts.get_mut(ctx) {
                context.error_mut().name = name;
            }
        })
    }

    pub fn context_error_get_name(&self, ctx: u32) -> Result<u32, Fault> {
        let name = self.with_state(|state| {
            state
                .contexts
                .get(ctx)
                .and_then(|c| c.error.as_ref())
                .and_then(|e| e.name.clone())
        })?;
        self.push_str(name.as_deref())
    }

    pub fn context_error_set_message(&self, ctx: u32, message: u32) -> Result<(), Fault> {
        let message = self.string(message)?;
        self.with_state(|state| {
            if let Some(context) = state.contexts.get_mut(ctx) {
                context.error_mut().message = message;
            }
        })
    }

    pub fn context_error_get_message(&self, ctx: u32) -> Result<u32, Fault> {
        let message = self.with_state(|state| {
            state
                .contexts
                .get(ctx)
                .and_then(|c| c.error.as_ref())
                .and_then(|e| e.message.clone())
        })?;
        self.push_str(message.as_deref())
    }

    pub fn context_error_set_location(&self, ctx: u32, location: u32) -> Result<(), Fault> {
        let location = self.string(location)?;
        self.with_state(|state| {
            if let Some(context) = state.contexts.get_mut(ctx) {
                context.error_mut().location = location;
            }
        })
    }

    pub fn context_error_get_location(&self, ctx: u32) -> Result<u32, Fault> {
        let location = self.with_state(|state| {
            state
                .contexts
                .get(ctx)
                .and_then(|c| c.error.as_ref())
                .and_then(|e| e.location.clone())
        })?;
        self.push_str(location.as_deref())
    }

    pub fn context_error_reset(&self, ctx: u32) -> Result<(), Fault> {
        self.with_state(|state| {
            if let Some(context) = state.contexts.get_mut(ctx) {
                context.error = None;
            }
        })
    }

    pub fn context_config_get(&self, ctx: u32, key: u32) -> Result<u32, Fault> {
        let Some(key) = self.string(key)? else {
            return Ok(NULL);
        };
        let value = self.with_state(|state| state.contexts.config_get(ctx, &key))?;
        self.push_str(value.as_deref())
    }

    pub fn context_config_set(&self, ctx: u32, key: u32, value: u32) -> Result<(), Fault> {
        let (Some(key), Some(value)) = (self.string(key)?, self.string(value)?) else {
            return Ok(());
        };
        self.with_state(|state| {
            state.contexts.config_set(ctx, &key, &value);
        })
    }

    pub fn env_get(&self, _ctx: u32, name: u32) -> Result<u32, Fault> {
        let Some(name) = self.string(name)? else {
            return Ok(NULL);
        };
        let value = self.with_state(|state| state.libc.env().get(&name).cloned())?;
        self.push_str(value.as_deref())
    }

    // ------------------------------------------------------------------
    // Structured values

    pub fn json_typeof(&self, handle: u32) -> Result<i32, Fault> {
        Ok(self
            .json(handle)?
            .map(|node| node.borrow().type_tag())
            .unwrap_or(json_type::EMPTY))
    }

    fn json_create(&self, ctx: u32, node: JsonNode) -> Result<u32, Fault> {
        self.with_state(|state| {
            if !state.contexts.contains(ctx) {
                return NULL;
            }
            state.create_reference(ctx, HostValue::Json(node.into_ref()))
        })
    }

    pub fn json_object_create(&self, ctx: u32) -> Result<u32, Fault> {
        self.json_create(ctx, JsonNode::Object(Vec::new()))
    }

    pub fn json_array_create(&self, ctx: u32) -> Result<u32, Fault> {
        self.json_create(ctx, JsonNode::Array(Vec::new()))
    }

    pub fn json_string_create(&self, ctx: u32, value: u32) -> Result<u32, Fault> {
        let value = self.string(value)?.unwrap_or_default();
        self.json_create(ctx, JsonNode::String(value))
    }

    pub fn json_boolean_create(&self, ctx: u32, value: bool) -> Result<u32, Fault> {
        self.json_create(ctx, JsonNode::Bool(value))
    }

    pub fn json_number_create(&self, ctx: u32, value: f64) -> Result<u32, Fault> {
        self.json_create(ctx, JsonNode::Number(value))
    }

    /// Parse `source` into a value; NULL when it is not valid JSON
    pub fn json_raw_from(&self, ctx: u32, source: u32) -> Result<u32, Fault> {
        let source = self.string(source)?.unwrap_or_default();
        match serde_json::from_str::<Value>(&source) {
            Ok(value) => self.with_state(|state| {
                if !state.contexts.contains(ctx) {
                    return NULL;
                }
                state.create_reference(ctx, HostValue::Json(json::from_value(&value)))
            }),
            Err(err) => {
                log::debug!("sapi_json_raw_from: {err}");
                Ok(NULL)
            }
        }
    }

    pub fn json_object_set_value(&self, object: u32, key: u32, value: u32) -> Result<(), Fault> {
        let (Some(object), Some(key), Some(value)) =
            (self.json(object)?, self.string(key)?, self.json(value)?)
        else {
            return Ok(());
        };
        object.borrow_mut().set(&key, value);
        Ok(())
    }

    pub fn json_object_get(&self, object: u32, key: u32) -> Result<u32, Fault> {
        let (Some(node), Some(key)) = (self.json(object)?, self.string(key)?) else {
            return Ok(NULL);
        };
        let Some(value) = node.borrow().get(&key) else {
            return Ok(NULL);
        };
        self.json_handle(object, value)
    }

    pub fn json_array_set_value(&self, array: u32, index: u32, value: u32) -> Result<(), Fault> {
        let (Some(array), Some(value)) = (self.json(array)?, self.json(value)?) else {
            return Ok(());
        };
        array.borrow_mut().set_at(index as usize, value);
        Ok(())
    }

    pub fn json_array_get(&self, array: u32, index: u32) -> Result<u32, Fault> {
        let Some(node) = self.json(array)? else {
            return Ok(NULL);
        };
        let Some(value) = node.borrow().at(index as usize) else {
            return Ok(NULL);
        };
        self.json_handle(array, value)
    }

    pub fn json_array_push_value(&self, array: u32, value: u32) -> Result<(), Fault> {
        let (Some(array), Some(value)) = (self.json(array)?, self.json(value)?) else {
            return Ok(());
        };
        array.borrow_mut().push(value);
        Ok(())
    }

    pub fn json_array_pop(&self, array: u32) -> Result<u32, Fault> {
        let Some(node) = self.json(array)? else {
            return Ok(NULL);
        };
        let Some(value) = node.borrow_mut().pop() else {
            return Ok(NULL);
        };
        self.json_handle(array, value)
    }

    /// Serialized form of any value handle; results serialize their body
    pub fn json_stringify_value(&self, handle: u32) -> Result<u32, Fault> {
        let node = match self.json(handle)? {
            Some(node) => Some(node),
            None => self.result(handle)?.map(|r| r.borrow().json()),
        };
        let Some(node) = node else {
            return Ok(NULL);
        };
        match json::stringify(&node) {
            Ok(text) => self.push_str(Some(&text)),
            Err(err) => {
                log::debug!("sapi_json_stringify_value: {err}");
                Ok(NULL)
            }
        }
    }

    // ------------------------------------------------------------------
    // Messages

    pub fn ipc_message_get_index(&self, message: u32) -> Result<i32, Fault> {
        Ok(self.message(message)?.map(|m| m.index()).unwrap_or(-1))
    }

    pub fn ipc_message_get_value(&self, message: u32) -> Result<u32, Fault> {
        let value = self.message(message)?.and_then(|m| m.value());
        self.push_str(value.as_deref())
    }

    /// Bytes copied into the message's context
    pub fn ipc_message_get_bytes(&self, message: u32) -> Result<u32, Fault> {
        let Some(msg) = self.message(message)? else {
            return Ok(NULL);
        };
        let Some(bytes) = msg.bytes() else {
            return Ok(NULL);
        };
        let owner = self.with_state(|state| state.owner_of(message).unwrap_or_else(|| state.root()))?;
        self.copy_bytes(owner, bytes)
    }

    pub fn ipc_message_get_bytes_size(&self, message: u32) -> Result<u32, Fault> {
        Ok(self
            .message(message)?
            .and_then(|m| m.bytes().map(|b| b.len() as u32))
            .unwrap_or(0))
    }

    pub fn ipc_message_get_name(&self, message: u32) -> Result<u32, Fault> {
        let name = self.message(message)?.map(|m| m.name());
        self.push_str(name.as_deref())
    }

    pub fn ipc_message_get_seq(&self, message: u32) -> Result<u32, Fault> {
        let seq = self.message(message)?.and_then(|m| m.seq());
        self.push_str(seq.as_deref())
    }

    pub fn ipc_message_get_uri(&self, message: u32) -> Result<u32, Fault> {
        let uri = self.message(message)?.map(|m| m.uri().to_string());
        self.push_str(uri.as_deref())
    }

    pub fn ipc_message_get(&self, message: u32, key: u32) -> Result<u32, Fault> {
        let (Some(msg), Some(key)) = (self.message(message)?, self.string(key)?) else {
            return Ok(NULL);
        };
        self.push_str(msg.get(&key).as_deref())
    }

    /// Independent copy owned by `ctx`
    pub fn ipc_message_clone(&self, ctx: u32, message: u32) -> Result<u32, Fault> {
        let Some(msg) = self.message(message)? else {
            return Ok(NULL);
        };
        let copy = Rc::new(Message::clone(&msg));
        self.with_state(|state| {
            if !state.contexts.contains(ctx) {
                return NULL;
            }
            state.create_reference(ctx, HostValue::Message(copy))
        })
    }

    // ------------------------------------------------------------------
    // Results

    /// Result for `message` in `ctx`, claiming the context's responder
    pub fn ipc_result_create(&self, ctx: u32, message: u32) -> Result<u32, Fault> {
        let message = self.message(message)?;
        self.with_state(|state| {
            if !state.contexts.contains(ctx) {
                return NULL;
            }
            state.create_result(ctx, message).0
        })
    }

    pub fn ipc_result_clone(&self, ctx: u32, result: u32) -> Result<u32, Fault> {
        let Some(result) = self.result(result)? else {
            return Ok(NULL);
        };
        let copy = result.borrow().clone_detached(ctx).into_ref();
        self.with_state(|state| {
            if !state.contexts.contains(ctx) {
                return NULL;
            }
            state.create_reference(ctx, HostValue::Result(copy))
        })
    }

    pub fn ipc_result_set_seq(&self, result: u32, seq: u32) -> Result<(), Fault> {
        let (Some(result), Some(seq)) = (self.result(result)?, self.string(seq)?) else {
            return Ok(());
        };
        result.borrow_mut().seq = seq;
        Ok(())
    }

    pub fn ipc_result_get_seq(&self, result: u32) -> Result<u32, Fault> {
        let seq = self.result(result)?.map(|r| r.borrow().seq.clone());
        self.push_str(seq.as_deref())
    }

    pub fn ipc_result_get_context(&self, result: u32) -> Result<u32, Fault> {
        Ok(self.result(result)?.map(|r| r.borrow().context).unwrap_or(NULL))
    }

    pub fn ipc_result_set_message(&self, result: u32, message: u32) -> Result<(), Fault> {
        let (Some(result), Some(message)) = (self.result(result)?, self.message(message)?) else {
            return Ok(());
        };
        result.borrow_mut().set_message(message);
        Ok(())
    }

    pub fn ipc_result_get_message(&self, result: u32) -> Result<u32, Fault> {
        let Some(result) = self.result(result)? else {
            return Ok(NULL);
        };
        let (context, message) = {
            let result = result.borrow();
            (result.context, result.message.clone())
        };
        let Some(message) = message else {
            return Ok(NULL);
        };
        self.with_state(|state| state.find_or_create_reference(context, HostValue::Message(message)))
    }

    pub fn ipc_result_set_json(&self, result: u32, value: u32) -> Result<(), Fault> {
        let (Some(result), Some(value)) = (self.result(result)?, self.json(value)?) else {
            return Ok(());
        };
        result.borrow_mut().set_json(value);
        Ok(())
    }

    pub fn ipc_result_get_json(&self, result: u32) -> Result<u32, Fault> {
        let Some(node) = self.result(result)?.map(|r| r.borrow().json()) else {
            return Ok(NULL);
        };
        self.json_handle(result, node)
    }

    pub fn ipc_result_set_json_data(&self, result: u32, value: u32) -> Result<(), Fault> {
        let (Some(result), Some(value)) = (self.result(result)?, self.json(value)?) else {
            return Ok(());
        };
        result.borrow_mut().data = Some(value);
        Ok(())
    }

    pub fn ipc_result_get_json_data(&self, result: u32) -> Result<u32, Fault> {
        let Some(node) = self.result(result)?.and_then(|r| r.borrow().data.clone()) else {
            return Ok(NULL);
        };
        self.json_handle(result, node)
    }

    pub fn ipc_result_set_json_error(&self, result: u32, value: u32) -> Result<(), Fault> {
        let (Some(result), Some(value)) = (self.result(result)?, self.json(value)?) else {
            return Ok(());
        };
        result.borrow_mut().err = Some(value);
        Ok(())
    }

    pub fn ipc_result_get_json_error(&self, result: u32) -> Result<u32, Fault> {
        let Some(node) = self.result(result)?.and_then(|r| r.borrow().err.clone()) else {
            return Ok(NULL);
        };
        self.json_handle(result, node)
    }

    pub fn ipc_result_set_bytes(&self, result: u32, size: u32, bytes: u32) -> Result<(), Fault> {
        let Some(result) = self.result(result)? else {
            return Ok(());
        };
        let bytes = if bytes == NULL || size == 0 {
            None
        } else {
            Some(self.adapter.read_bytes(bytes, size)?)
        };
        result.borrow_mut().bytes = bytes;
        Ok(())
    }

    pub fn ipc_result_get_bytes(&self, result: u32) -> Result<u32, Fault> {
        let Some(result) = self.result(result)? else {
            return Ok(NULL);
        };
        let (context, bytes) = {
            let result = result.borrow();
            (result.context, result.bytes.clone())
        };
        match bytes {
            Some(bytes) => self.copy_bytes(context, &bytes),
            None => Ok(NULL),
        }
    }

    pub fn ipc_result_get_bytes_size(&self, result: u32) -> Result<u32, Fault> {
        Ok(self
            .result(result)?
            .and_then(|r| r.borrow().bytes.as_ref().map(|b| b.len() as u32))
            .unwrap_or(0))
    }

    pub fn ipc_result_set_header(&self, result: u32, name: u32, value: u32) -> Result<(), Fault> {
        let (Some(result), Some(name), Some(value)) =
            (self.result(result)?, self.string(name)?, self.string(value)?)
        else {
            return Ok(());
        };
        result.borrow_mut().set_header(&name, &value);
        Ok(())
    }

    pub fn ipc_result_get_header(&self, result: u32, name: u32) -> Result<u32, Fault> {
        let (Some(result), Some(name)) = (self.result(result)?, self.string(name)?) else {
            return Ok(NULL);
        };
        let value = result.borrow().header(&name).map(str::to_string);
        self.push_str(value.as_deref())
    }

    pub fn ipc_result_from_json(&self, ctx: u32, message: u32, value: u32) -> Result<u32, Fault> {
        let handle = self.ipc_result_create(ctx, message)?;
        if handle != NULL {
            self.ipc_result_set_json(handle, value)?;
        }
        Ok(handle)
    }

    pub fn ipc_reply(&self, result: u32) -> Result<bool, Fault> {
        match self.result(result)? {
            Some(result) => self.adapter.reply(&result),
            None => Ok(false),
        }
    }

    /// `error` is parsed as JSON when it can be, else used as the message
    pub fn ipc_reply_with_error(&self, result: u32, error: u32) -> Result<bool, Fault> {
        let Some(result) = self.result(result)? else {
            return Ok(false);
        };
        let error = self.string(error)?.unwrap_or_default();
        let value = serde_json::from_str(&error).unwrap_or(Value::String(error));
        self.adapter.reply_with_error(&result, &value)
    }

    // ------------------------------------------------------------------
    // Routing and events

    pub fn ipc_router_map(&self, ctx: u32, route: u32, callback: u32, data: u32) -> Result<bool, Fault> {
        if !self.allowed(ctx, "ipc_router_map")? {
            return Ok(false);
        }
        let Some(route) = self.string(route)? else {
            return Ok(false);
        };
        self.with_state(|state| state.router.map(&route, Handler::Module { callback, data }))
    }

    pub fn ipc_router_unmap(&self, ctx: u32, route: u32) -> Result<bool, Fault> {
        if !self.allowed(ctx, "ipc_router_unmap")? {
            return Ok(false);
        }
        let Some(route) = self.string(route)? else {
            return Ok(false);
        };
        self.with_state(|state| state.router.unmap(&route))
    }

    /// Token for `unlisten`, 0 on failure
    pub fn ipc_router_listen(&self, ctx: u32, route: u32, callback: u32, data: u32) -> Result<u64, Fault> {
        if !self.allowed(ctx, "ipc_router_listen")? {
            return Ok(0);
        }
        let Some(route) = self.string(route)? else {
            return Ok(0);
        };
        self.with_state(|state| state.router.listen(&route, Handler::Module { callback, data }) as u64)
    }

    pub fn ipc_router_unlisten(&self, ctx: u32, route: u32, token: u64) -> Result<bool, Fault> {
        if !self.allowed(ctx, "ipc_router_unlisten")? {
            return Ok(false);
        }
        let (Some(route), Ok(token)) = (self.string(route)?, u32::try_from(token)) else {
            return Ok(false);
        };
        self.with_state(|state| state.router.unlisten(&route, token))
    }

    /// Route `url` from `ctx`; `callback(result, ctx)` receives the reply
    pub fn ipc_invoke(&self, ctx: u32, url: u32, size: u32, bytes: u32, callback: u32) -> Result<bool, Fault> {
        if !self.allowed(ctx, "ipc_invoke")? {
            return Ok(false);
        }
        let Some(url) = self.string(url)? else {
            return Ok(false);
        };
        let bytes = if bytes == NULL || size == 0 {
            None
        } else {
            Some(self.adapter.read_bytes(bytes, size)?)
        };
        self.adapter
            .invoke(ctx, &url, bytes, Responder::Module { callback })
    }

    /// `data` is parsed as JSON when it can be, else sent as a string
    pub fn ipc_emit(&self, ctx: u32, name: u32, data: u32) -> Result<bool, Fault> {
        if !self.allowed(ctx, "ipc_emit")? {
            return Ok(false);
        }
        let Some(name) = self.string(name)?.filter(|n| !n.is_empty()) else {
            return Ok(false);
        };
        let data = self.string(data)?.unwrap_or_default();
        let value = serde_json::from_str(&data).unwrap_or(Value::String(data));
        self.adapter.emit(ctx, &name, value)?;
        Ok(true)
    }

    /// Push `value` to the host for `message`'s sequence id; without a
    /// sequence id it is broadcast on the default event
    pub fn ipc_send_json(&self, ctx: u32, message: u32, value: u32) -> Result<bool, Fault> {
        if !self.allowed(ctx, "ipc_send")? {
            return Ok(false);
        }
        let Some(value) = self.json(value)? else {
            return Ok(false);
        };
        let mut result = IpcResult::new(ctx, self.message(message)?);
        result.claim(Responder::Bus(self.adapter.bus()), false);
        result.set_json(value);
        let result = result.into_ref();
        self.adapter.reply(&result)
    }

    /// Post raw bytes with `headers` (`Name: value` lines) to the host
    pub fn ipc_send_bytes(
        &self,
        ctx: u32,
        message: u32,
        size: u32,
        bytes: u32,
        headers: u32,
    ) -> Result<bool, Fault> {
        if !self.allowed(ctx, "ipc_send")? {
            return Ok(false);
        }
        let seq = self
            .message(message)?
            .and_then(|m| m.seq())
            .unwrap_or_else(|| crate::ipc::result::BROADCAST_SEQ.to_string());
        let bytes = if bytes == NULL || size == 0 {
            Vec::new()
        } else {
            self.adapter.read_bytes(bytes, size)?
        };
        let headers = parse_headers(&self.string(headers)?.unwrap_or_default());
        let value = json!({ "headers": headers, "event": DEFAULT_EVENT });
        Ok(self.adapter.bus().send(&seq, value, Some(&bytes)))
    }

    // ------------------------------------------------------------------
    // Processes

    fn process_unsupported<T>(&self, name: &str, sentinel: T) -> Result<T, Fault> {
        log::warn!("{name}: Operation is not supported");
        Ok(sentinel)
    }

    pub fn process_exec(&self, _ctx: u32, _command: u32) -> Result<u32, Fault> {
        self.process_unsupported("sapi_process_exec", NULL)
    }

    pub fn process_exec_get_exit_code(&self, _process: u32) -> Result<i32, Fault> {
        self.process_unsupported("sapi_process_exec_get_exit_code", -1)
    }

    pub fn process_exec_get_output(&self, _process: u32) -> Result<u32, Fault> {
        self.process_unsupported("sapi_process_exec_get_output", NULL)
    }

    pub fn process_spawn(
        &self,
        _ctx: u32,
        _command: u32,
        _argv: u32,
        _path: u32,
        _on_stdout: u32,
        _on_stderr: u32,
        _on_exit: u32,
    ) -> Result<u32, Fault> {
        self.process_unsupported("sapi_process_spawn", NULL)
    }

    pub fn process_spawn_get_exit_code(&self, _process: u32) -> Result<i32, Fault> {
        self.process_unsupported("sapi_process_spawn_get_exit_code", -1)
    }

    pub fn process_spawn_get_pid(&self, _process: u32) -> Result<u32, Fault> {
        self.process_unsupported("sapi_process_spawn_get_pid", 0)
    }

    pub fn process_spawn_get_context(&self, _process: u32) -> Result<u32, Fault> {
        self.process_unsupported("sapi_process_spawn_get_context", NULL)
    }

    pub fn process_spawn_wait(&self, _process: u32) -> Result<i32, Fault> {
        self.process_unsupported("sapi_process_spawn_wait", -1)
    }

    pub fn process_spawn_write(&self, _process: u32, _data: u32, _size: u32) -> Result<bool, Fault> {
        self.process_unsupported("sapi_process_spawn_write", false)
    }

    pub fn process_spawn_close_stdin(&self, _process: u32) -> Result<bool, Fault> {
        self.process_unsupported("sapi_process_spawn_close_stdin", false)
    }

    pub fn process_spawn_kill(&self, _process: u32, _signal: i32) -> Result<bool, Fault> {
        self.process_unsupported("sapi_process_spawn_kill", false)
    }
}

/// `Name: value` lines into pairs; malformed lines are skipped
pub fn parse_headers(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(target_arch = "wasm32")]
fn random_u64() -> u64 {
    let high = (js_sys::Math::random() * 4_294_967_296.0) as u64;
    let low = (js_sys::Math::random() * 4_294_967_296.0) as u64;
    (high << 32) | low
}

#[cfg(not(target_arch = "wasm32"))]
fn random_u64() -> u64 {
    use std::hash::{BuildHasher, Hasher};
    let mut hasher = std::collections::hash_map::RandomState::new().build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    );
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers("Content-Type: text/plain\nbroken\n: empty\nX-Id:7");
        assert_eq!(
            headers,
            vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("X-Id".to_string(), "7".to_string()),
            ]
        );
    }

    #[test]
    fn test_random_varies() {
        let draws: std::collections::HashSet<u64> = (0..8).map(|_| random_u64()).collect();
        assert!(draws.len() > 1);
    }
}

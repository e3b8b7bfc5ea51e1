//! Request routing
//!
//! Routes map a message name to a handler. A handler is either a module
//! callback (table index plus the user data pointer given at map time) or a
//! host closure. Each invocation runs in a fresh retained child of the
//! caller's context; the result created for it releases that child once it
//! has been replied to. A handler that returns without creating a result,
//! and without retaining its context, has the child released on the spot.
//!
//! Event listeners are kept per event name in a `Slab`, so the token handed
//! back by `listen` is stable until `unlisten`.

use super::bus::BusResponse;
use super::message::Message;
use super::result::{IpcResult, ResultRef, Responder};
use crate::extension::abi::NULL;
use crate::extension::adapter::{Adapter, AdapterState};
use crate::extension::context::Lifecycle;
use crate::extension::error::Fault;
use crate::extension::json;
use crate::extension::reference::HostValue;
use crate::extension::table::Argument;
use serde_json::Value;
use slab::Slab;
use std::collections::HashMap;
use std::rc::Rc;
use url::Url;

/// A host-side route handler, called with the invocation context
pub type HostHandler = Rc<dyn Fn(&Adapter, u32, Rc<Message>) -> Result<(), Fault>>;

#[derive(Clone)]
pub enum Handler {
    Module { callback: u32, data: u32 },
    Host(HostHandler),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Module { callback, data } => f
                .debug_struct("Module")
                .field("callback", callback)
                .field("data", data)
                .finish(),
            Handler::Host(_) => f.write_str("Host"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Router {
    routes: HashMap<String, Handler>,
    listeners: HashMap<String, Slab<Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `route`, replacing any previous handler
    pub fn map(&mut self, route: &str, handler: Handler) -> bool {
        if route.is_empty() {
            return false;
        }
        self.routes.insert(route.to_string(), handler);
        true
    }

    pub fn unmap(&mut self, route: &str) -> bool {
        self.routes.remove(route).is_some()
    }

    pub fn lookup(&self, route: &str) -> Option<Handler> {
        self.routes.get(route).cloned()
    }

    pub fn contains(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.keys().cloned().collect();
        routes.sort();
        routes
    }

    /// Register a listener, returning a non-zero token
    pub fn listen(&mut self, event: &str, handler: Handler) -> u32 {
        if event.is_empty() {
            return 0;
        }
        let key = self
            .listeners
            .entry(event.to_string())
            .or_default()
            .insert(handler);
        key as u32 + 1
    }

    pub fn unlisten(&mut self, event: &str, token: u32) -> bool {
        let Some(listeners) = self.listeners.get_mut(event) else {
            return false;
        };
        let Some(key) = (token as usize).checked_sub(1) else {
            return false;
        };
        if listeners.try_remove(key).is_none() {
            return false;
        }
        if listeners.is_empty() {
            self.listeners.remove(event);
        }
        true
    }

    pub fn listeners(&self, event: &str) -> Vec<Handler> {
        self.listeners
            .get(event)
            .map(|slab| slab.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
        self.listeners.clear();
    }
}

impl AdapterState {
    /// Create a result in `ctx`, claiming the context's pending responder
    pub fn create_result(&mut self, ctx: u32, message: Option<Rc<Message>>) -> (u32, ResultRef) {
        let result = IpcResult::new(ctx, message).into_ref();
        if let Some(responder) = self
            .contexts
            .get_mut(ctx)
            .and_then(|context| context.responder.take())
        {
            result.borrow_mut().claim(responder, true);
        }
        let handle = self.create_reference(ctx, HostValue::Result(Rc::clone(&result)));
        (handle, result)
    }
}

impl Adapter {
    /// Route `uri` from `parent`
    ///
    /// Returns `false`, allocating nothing, when the URI does not parse or
    /// no route matches.
    pub fn invoke(
        &self,
        parent: u32,
        uri: &str,
        bytes: Option<Vec<u8>>,
        responder: Responder,
    ) -> Result<bool, Fault> {
        let Ok(message) = Message::parse(uri, bytes) else {
            log::debug!("ignoring malformed request uri '{uri}'");
            return Ok(false);
        };
        let name = message.name();
        let Some(handler) = self.with_state(|state| state.router.lookup(&name))? else {
            log::debug!("no route for '{name}'");
            return Ok(false);
        };

        self.run_handler(parent, handler, Rc::new(message), Some(responder), false)?;
        Ok(true)
    }

    /// Run a handler in a new retained child of `parent`
    ///
    /// With `scoped`, the child is released as soon as the handler returns.
    fn run_handler(
        &self,
        parent: u32,
        handler: Handler,
        message: Rc<Message>,
        responder: Option<Responder>,
        scoped: bool,
    ) -> Result<(), Fault> {
        let (ctx, handle) = self.with_state(|state| {
            let ctx = state.create_context(Some(parent), true);
            let Some(context) = state.contexts.get_mut(ctx) else {
                return (NULL, NULL);
            };
            if let Handler::Module { data, .. } = &handler {
                context.data = *data;
            }
            context.responder = responder;
            let handle = state.create_reference(ctx, HostValue::Message(Rc::clone(&message)));
            (ctx, handle)
        })?;
        if ctx == NULL || handle == NULL {
            return Err(Fault::Trap("out of memory dispatching a request".to_string()));
        }

        match handler {
            Handler::Module { callback, .. } => {
                self.table()
                    .call(callback, &[Argument::Ptr(ctx), Argument::Ptr(handle), Argument::Ptr(NULL)])?;
            }
            Handler::Host(handler) => handler(self, ctx, Rc::clone(&message))?,
        }

        // unless the handler kept its own reference to answer later, a
        // responder nobody claimed can never be answered
        let unclaimed = self.with_state(|state| {
            let unclaimed = state
                .contexts
                .get_mut(ctx)
                .filter(|context| context.lifecycle() == Lifecycle::Retained(1))
                .and_then(|context| context.responder.take());
            if scoped || unclaimed.is_some() {
                state.release_context(ctx);
            }
            unclaimed
        })?;
        if unclaimed.is_some() {
            log::debug!("'{}' returned without a result", message.name());
        }
        Ok(())
    }

    /// Deliver a result to its responder
    ///
    /// A module responder's callback receives the result handle and its
    /// context. Returns `false` when the result was already replied to or
    /// abandoned.
    pub fn reply(&self, result: &ResultRef) -> Result<bool, Fault> {
        let completed = result.borrow_mut().complete();
        let Some((responder, reply, release)) = completed else {
            return Ok(false);
        };
        let context = result.borrow().context;

        if let Some(callback) = responder.deliver(reply) {
            let handle = self.with_state(|state| {
                state.find_or_create_reference(context, HostValue::Result(Rc::clone(result)))
            })?;
            self.table()
                .call(callback, &[Argument::Ptr(handle), Argument::Ptr(context)])?;
        }

        if release {
            self.with_state(|state| state.release_context(context))?;
        }
        Ok(true)
    }

    /// Reply with a structured error built from `err`
    pub fn reply_with_error(&self, result: &ResultRef, err: &Value) -> Result<bool, Fault> {
        result.borrow_mut().set_error_value(err);
        self.reply(result)
    }

    /// Notify listeners of `event`, then broadcast it on the host bus
    pub fn emit(&self, ctx: u32, event: &str, data: Value) -> Result<(), Fault> {
        let listeners = self.with_state(|state| state.router.listeners(event))?;
        if !listeners.is_empty() {
            let mut uri = Url::parse("ipc://event").map_err(|e| Fault::Trap(e.to_string()))?;
            uri.query_pairs_mut()
                .append_pair("name", event)
                .append_pair("value", &data.to_string());
            let message = Rc::new(
                Message::parse(uri.as_str(), None).map_err(|e| Fault::Trap(e.to_string()))?,
            );
            for handler in listeners {
                self.run_handler(ctx, handler, Rc::clone(&message), None, true)?;
            }
        }

        self.bus().emit(event, data);
        Ok(())
    }

    /// Map `route` to a handler that forwards messages to the host bus
    ///
    /// The reply is delivered when the bus answers. A bus error becomes a
    /// structured error on the result.
    pub fn map_bus(&self, route: &str) -> Result<bool, Fault> {
        let handler: HostHandler = Rc::new(forward_to_bus);
        self.with_state(|state| state.router.map(route, Handler::Host(handler)))
    }

    /// Map `route` to a host closure
    pub fn map_host(
        &self,
        route: &str,
        handler: impl Fn(&Adapter, u32, Rc<Message>) -> Result<(), Fault> + 'static,
    ) -> Result<bool, Fault> {
        let handler: HostHandler = Rc::new(handler);
        self.with_state(|state| state.router.map(route, Handler::Host(handler)))
    }
}

fn forward_to_bus(adapter: &Adapter, ctx: u32, message: Rc<Message>) -> Result<(), Fault> {
    let (_, result) =
        adapter.with_state(|state| state.create_result(ctx, Some(Rc::clone(&message))))?;

    let params = Value::Object(message.params().clone());
    let response = adapter.bus().request(&message.name(), params);
    let weak = adapter.downgrade();

    adapter.scheduler().spawn(async move {
        let response: BusResponse = response.await;
        let Some(adapter) = weak.upgrade() else {
            return;
        };
        if adapter.is_destroyed() {
            return;
        }

        let outcome = match response.err {
            Some(err) => adapter.reply_with_error(&result, &err),
            None => {
                result.borrow_mut().data = response.data.as_ref().map(json::from_value);
                adapter.reply(&result)
            }
        };
        let _ = adapter.guard(outcome);
    });
    Ok(())
}

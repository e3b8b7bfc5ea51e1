//! The host request bus
//!
//! The bridge never talks to the native host directly. Everything that
//! leaves the sandbox goes through a `HostBus`: stats and byte fetches at
//! load time, forwarded requests, replies and broadcast events.

use super::result::Reply;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Event name used for replies whose sequence id is `-1`
pub const DEFAULT_EVENT: &str = "data";

/// Response to a bus request: `data` on success, `err` on failure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<Value>,
}

impl BusResponse {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            err: None,
        }
    }

    pub fn error(err: Value) -> Self {
        Self {
            data: None,
            err: Some(err),
        }
    }

    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

/// Transport to the native host
pub trait HostBus {
    /// Asynchronous request/response
    fn request(&self, route: &str, params: Value) -> LocalBoxFuture<'static, BusResponse>;

    /// Blocking request, used by the synchronous binding verb
    fn request_sync(&self, route: &str, params: Value) -> BusResponse;

    /// Broadcast an event
    fn emit(&self, event: &str, data: Value);

    /// Resolve the pending request identified by `seq`
    fn resolve(&self, seq: &str, reply: &Reply);

    /// Post a value and optional bytes for `seq` without a pending request
    fn send(&self, seq: &str, value: Value, bytes: Option<&[u8]>) -> bool;

    /// Fetch a resource by path
    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, BusError>>;
}

pub type BusHandler = Rc<dyn Fn(&Value) -> BusResponse>;

/// In-process bus serving routes from registered closures
///
/// Emitted events, resolved replies and sends are recorded so the embedder
/// can inspect them.
#[derive(Default)]
pub struct LocalBus {
    handlers: RefCell<HashMap<String, BusHandler>>,
    files: RefCell<HashMap<String, Vec<u8>>>,
    events: RefCell<Vec<(String, Value)>>,
    resolved: RefCell<Vec<Reply>>,
    sent: RefCell<Vec<(String, Value)>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, route: &str, handler: impl Fn(&Value) -> BusResponse + 'static) {
        self.handlers
            .borrow_mut()
            .insert(route.to_string(), Rc::new(handler));
    }

    pub fn serve_file(&self, path: &str, bytes: Vec<u8>) {
        self.files.borrow_mut().insert(path.to_string(), bytes);
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.borrow().clone()
    }

    pub fn resolved(&self) -> Vec<Reply> {
        self.resolved.borrow().clone()
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.borrow().clone()
    }

    fn dispatch(&self, route: &str, params: &Value) -> BusResponse {
        let handler = self.handlers.borrow().get(route).cloned();
        match handler {
            Some(handler) => handler(params),
            None => BusResponse::error(json!({
                "type": "NotFoundError",
                "message": format!("No handler for route '{route}'"),
            })),
        }
    }
}

impl HostBus for LocalBus {
    fn request(&self, route: &str, params: Value) -> LocalBoxFuture<'static, BusResponse> {
        let response = self.dispatch(route, &params);
        futures::future::ready(response).boxed_local()
    }

    fn request_sync(&self, route: &str, params: Value) -> BusResponse {
        self.dispatch(route, &params)
    }

    fn emit(&self, event: &str, data: Value) {
        self.events.borrow_mut().push((event.to_string(), data));
    }

    fn resolve(&self, _seq: &str, reply: &Reply) {
        self.resolved.borrow_mut().push(reply.clone());
    }

    fn send(&self, seq: &str, value: Value, _bytes: Option<&[u8]>) -> bool {
        self.sent.borrow_mut().push((seq.to_string(), value));
        true
    }

    fn fetch(&self, path: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, BusError>> {
        let result = self
            .files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| BusError::NotFound(path.to_string()));
        futures::future::ready(result).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_local_bus_routes() {
        let bus = LocalBus::new();
        bus.handle("extension.type", |params| {
            BusResponse::data(json!({"name": params["name"], "type": "wasm32"}))
        });

        let response = block_on(bus.request("extension.type", json!({"name": "echo"})));
        assert_eq!(response.data, Some(json!({"name": "echo", "type": "wasm32"})));

        let missing = bus.request_sync("nope", Value::Null);
        assert!(missing.is_err());
    }

    #[test]
    fn test_local_bus_fetch() {
        let bus = LocalBus::new();
        bus.serve_file("/socket/extensions/echo/echo.wasm", vec![0, 0x61, 0x73, 0x6d]);
        assert_eq!(
            block_on(bus.fetch("/socket/extensions/echo/echo.wasm")).unwrap().len(),
            4
        );
        assert!(matches!(block_on(bus.fetch("/missing")), Err(BusError::NotFound(_))));
    }

    #[test]
    fn test_bus_response_serde() {
        let response: BusResponse = serde_json::from_value(json!({"err": {"message": "no"}})).unwrap();
        assert!(response.is_err());
        assert_eq!(serde_json::to_value(BusResponse::data(json!(1))).unwrap(), json!({"data": 1}));
    }
}

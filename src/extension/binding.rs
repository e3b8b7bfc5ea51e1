//! Extension bindings
//!
//! Application code talks to a loaded extension through a `Binding`. Each
//! call is described by a `RequestDescriptor`: a route path, parameters, an
//! optional byte payload and an optional verb. When the descriptor carries no
//! verb, the binding options decide, first per path and then by default.
//!
//! A sandboxed extension answers through its adapter's router. A shared
//! extension lives in the native host, so every call is proxied over the
//! host bus under `<binding name>.<path>`.

use super::adapter::Adapter;
use super::error::{ExtensionError, ExtensionResult};
use crate::ipc::bus::{BusResponse, HostBus};
use crate::ipc::message::SCHEME_PREFIX;
use crate::ipc::result::Reply;
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::rc::Rc;

/// How a call is carried to the extension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verb {
    /// Await the reply
    #[default]
    Request,
    /// Deliver without waiting for a reply
    Send,
    /// Block until the reply is available
    SendSync,
    /// Broadcast to listeners
    Emit,
    /// Deliver a byte payload
    Write,
}

const VERBS: [(&str, Verb); 5] = [
    ("request", Verb::Request),
    ("send", Verb::Send),
    ("sendSync", Verb::SendSync),
    ("emit", Verb::Emit),
    ("write", Verb::Write),
];

impl Verb {
    pub fn from_name(name: &str) -> Option<Self> {
        VERBS.iter().find(|(n, _)| *n == name).map(|(_, verb)| *verb)
    }

    pub fn name(self) -> &'static str {
        VERBS
            .iter()
            .find(|(_, verb)| *verb == self)
            .map(|(n, _)| *n)
            .unwrap_or("request")
    }
}

/// Verb selection for a binding
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BindingOptions {
    /// Route prefix for shared extensions; the extension name when absent
    pub name: Option<String>,
    /// Verb for paths without an override
    pub default: Verb,
    /// Per-path verb overrides
    pub methods: BTreeMap<String, Verb>,
}

impl BindingOptions {
    pub fn verb_for(&self, path: &str) -> Verb {
        self.methods.get(path).copied().unwrap_or(self.default)
    }
}

/// One call through a binding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescriptor {
    pub path: String,
    pub params: Map<String, Value>,
    pub bytes: Option<Vec<u8>>,
    pub verb: Option<Verb>,
}

impl RequestDescriptor {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Merge the fields of a JSON object into the parameters
    pub fn params(mut self, value: Value) -> Self {
        if let Value::Object(map) = value {
            self.params.extend(map);
        }
        self
    }

    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verb = Some(verb);
        self
    }

    /// `ipc://<path>?k=v...` with string parameters kept verbatim and
    /// everything else in its JSON form
    pub fn uri(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.params {
            match value {
                Value::String(s) => query.append_pair(key, s),
                other => query.append_pair(key, &other.to_string()),
            };
        }
        let query = query.finish();
        if query.is_empty() {
            format!("{SCHEME_PREFIX}{}", self.path)
        } else {
            format!("{SCHEME_PREFIX}{}?{query}", self.path)
        }
    }
}

enum Target {
    Sandboxed(Adapter),
    Shared { bus: Rc<dyn HostBus>, prefix: String },
}

/// Call surface of one loaded extension
pub struct Binding {
    target: Target,
    options: BindingOptions,
}

impl Binding {
    pub fn sandboxed(adapter: Adapter, options: BindingOptions) -> Self {
        Self {
            target: Target::Sandboxed(adapter),
            options,
        }
    }

    pub fn shared(bus: Rc<dyn HostBus>, name: &str, options: BindingOptions) -> Self {
        let prefix = options.name.clone().unwrap_or_else(|| name.to_string());
        Self {
            target: Target::Shared { bus, prefix },
            options,
        }
    }

    pub fn options(&self) -> &BindingOptions {
        &self.options
    }

    /// The verb a descriptor resolves to
    pub fn verb_for(&self, descriptor: &RequestDescriptor) -> Verb {
        descriptor
            .verb
            .unwrap_or_else(|| self.options.verb_for(&descriptor.path))
    }

    /// Carry `descriptor` to the extension
    ///
    /// Verbs that do not wait for a reply resolve to an empty response.
    pub async fn call(&self, descriptor: RequestDescriptor) -> ExtensionResult<BusResponse> {
        let verb = self.verb_for(&descriptor);
        match &self.target {
            Target::Sandboxed(adapter) => call_sandboxed(adapter, verb, descriptor).await,
            Target::Shared { bus, prefix } => {
                let route = format!("{prefix}.{}", descriptor.path);
                Ok(call_shared(bus.as_ref(), &route, verb, descriptor).await)
            }
        }
    }
}

async fn call_sandboxed(
    adapter: &Adapter,
    verb: Verb,
    descriptor: RequestDescriptor,
) -> ExtensionResult<BusResponse> {
    if adapter.is_destroyed() {
        return Err(ExtensionError::Destroyed);
    }

    if verb == Verb::Emit {
        let root = adapter.root_context();
        let result = adapter.emit(root, &descriptor.path, Value::Object(descriptor.params));
        adapter.guard(result)?;
        adapter.run_until_stalled();
        return Ok(BusResponse::default());
    }

    let uri = descriptor.uri();
    let (sender, receiver) = oneshot::channel();
    let on_reply = move |reply: Reply| {
        // the receiver is gone for verbs that do not wait
        let _ = sender.send(reply);
    };

    if !adapter.request(&uri, descriptor.bytes, on_reply)? {
        return Err(ExtensionError::NoRoute(descriptor.path));
    }
    adapter.run_until_stalled();

    match verb {
        Verb::Send | Verb::Write => Ok(BusResponse::default()),
        _ => {
            let reply = receiver.await.map_err(|_| {
                ExtensionError::Bus(format!("'{}' was abandoned without a reply", descriptor.path))
            })?;
            Ok(into_response(reply))
        }
    }
}

async fn call_shared(
    bus: &dyn HostBus,
    route: &str,
    verb: Verb,
    descriptor: RequestDescriptor,
) -> BusResponse {
    let params = Value::Object(descriptor.params);
    match verb {
        Verb::Request => bus.request(route, params).await,
        Verb::SendSync => bus.request_sync(route, params),
        Verb::Send => {
            let response = bus.request(route, params).await;
            match response.err {
                Some(err) => BusResponse::error(err),
                None => BusResponse::default(),
            }
        }
        Verb::Emit => {
            bus.emit(route, params);
            BusResponse::default()
        }
        Verb::Write => {
            if bus.send(route, params, descriptor.bytes.as_deref()) {
                BusResponse::default()
            } else {
                BusResponse::error(serde_json::json!({
                    "type": "Error",
                    "message": format!("write to '{route}' was not accepted"),
                }))
            }
        }
    }
}

fn into_response(reply: Reply) -> BusResponse {
    match reply.err {
        Some(err) => BusResponse::error(err),
        None => BusResponse::data(reply.data.unwrap_or(Value::Null)),
    }
}

//! In-flight responses
//!
//! A result is bound to at most one responder. Replying takes the responder
//! out of the result, so whichever of `reply` and `reply_with_error` runs
//! first is the only one that delivers anything.

use super::bus::{DEFAULT_EVENT, HostBus};
use super::message::Message;
use crate::extension::json::{self, JsonNode, JsonRef};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;

/// Sequence id meaning "broadcast" rather than "resolve a request"
pub const BROADCAST_SEQ: &str = "-1";

pub type ResultRef = Rc<RefCell<IpcResult>>;

/// A finished result as delivered to its responder
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub seq: String,
    pub source: String,
    pub data: Option<Value>,
    pub err: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub bytes: Option<Vec<u8>>,
}

impl Reply {
    pub fn is_broadcast(&self) -> bool {
        self.seq == BROADCAST_SEQ
    }

    /// `{source, data}` or `{source, err}`
    pub fn to_json(&self) -> Value {
        let mut value = json!({ "source": self.source });
        if let Some(err) = &self.err {
            value["err"] = err.clone();
        } else {
            value["data"] = self.data.clone().unwrap_or(Value::Null);
        }
        value
    }
}

/// Where a reply goes
pub enum Responder {
    /// A host closure waiting on `invoke`
    Host(Box<dyn FnOnce(Reply)>),
    /// A module callback table index, called with the result handle
    Module { callback: u32 },
    /// Back over the host bus
    Bus(Rc<dyn HostBus>),
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Responder::Host(_) => f.write_str("Responder::Host"),
            Responder::Module { callback } => write!(f, "Responder::Module({callback})"),
            Responder::Bus(_) => f.write_str("Responder::Bus"),
        }
    }
}

impl Responder {
    /// Deliver to a host-side responder; module callbacks are left to the caller
    pub fn deliver(self, reply: Reply) -> Option<u32> {
        match self {
            Responder::Host(callback) => {
                callback(reply);
                None
            }
            Responder::Bus(bus) => {
                if reply.is_broadcast() {
                    bus.emit(DEFAULT_EVENT, reply.to_json());
                } else {
                    bus.resolve(&reply.seq, &reply);
                }
                None
            }
            Responder::Module { callback } => Some(callback),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultState {
    Pending,
    Replied,
    Abandoned,
}

/// A response under construction
#[derive(Debug)]
pub struct IpcResult {
    pub seq: String,
    pub source: String,
    /// Context the result was created in
    pub context: u32,
    pub message: Option<Rc<Message>>,
    pub value: Option<JsonRef>,
    pub data: Option<JsonRef>,
    pub err: Option<JsonRef>,
    pub headers: Vec<(String, String)>,
    pub bytes: Option<Vec<u8>>,
    responder: Option<Responder>,
    release_context: bool,
    state: ResultState,
}

impl IpcResult {
    pub fn new(context: u32, message: Option<Rc<Message>>) -> Self {
        let mut result = Self {
            seq: BROADCAST_SEQ.to_string(),
            source: String::new(),
            context,
            message: None,
            value: None,
            data: None,
            err: None,
            headers: Vec::new(),
            bytes: None,
            responder: None,
            release_context: false,
            state: ResultState::Pending,
        };
        if let Some(message) = message {
            result.set_message(message);
        }
        result
    }

    pub fn into_ref(self) -> ResultRef {
        Rc::new(RefCell::new(self))
    }

    /// Copy of another result's contents, without its responder
    pub fn clone_detached(&self, context: u32) -> Self {
        Self {
            seq: self.seq.clone(),
            source: self.source.clone(),
            context,
            message: self.message.clone(),
            value: self.value.clone(),
            data: self.data.clone(),
            err: self.err.clone(),
            headers: self.headers.clone(),
            bytes: self.bytes.clone(),
            responder: None,
            release_context: false,
            state: ResultState::Pending,
        }
    }

    pub fn state(&self) -> ResultState {
        self.state
    }

    pub fn has_responder(&self) -> bool {
        self.responder.is_some()
    }

    /// Bind the responder; `release_context` asks for the creating context
    /// to be released once after the reply
    pub fn claim(&mut self, responder: Responder, release_context: bool) {
        self.responder = Some(responder);
        self.release_context = release_context;
    }

    pub fn set_message(&mut self, message: Rc<Message>) {
        if let Some(seq) = message.seq() {
            self.seq = seq;
        }
        self.source = message.name();
        self.message = Some(message);
    }

    /// Set the whole body; `{data}` and `{err}` envelopes are unpacked
    pub fn set_json(&mut self, value: JsonRef) {
        let (data, err) = {
            let node = value.borrow();
            (node.get("data"), node.get("err"))
        };
        match (data, err) {
            (_, Some(err)) => self.err = Some(err),
            (Some(data), None) => self.data = Some(data),
            (None, None) => self.data = Some(Rc::clone(&value)),
        }
        self.value = Some(value);
    }

    /// The body as last set, or a `{data, err}` envelope built on demand
    pub fn json(&self) -> JsonRef {
        if let Some(value) = &self.value {
            return Rc::clone(value);
        }
        let mut envelope = JsonNode::Object(Vec::new());
        if let Some(data) = &self.data {
            envelope.set("data", Rc::clone(data));
        }
        if let Some(err) = &self.err {
            envelope.set("err", Rc::clone(err));
        }
        envelope.into_ref()
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Record a structured error from a plain value
    pub fn set_error_value(&mut self, err: &Value) {
        let structured = structured_error(err);
        self.err = Some(json::from_value(&structured));
    }

    /// Finish the result, handing back its responder and payload
    ///
    /// Returns `None` once replied or abandoned, or when nothing claimed it.
    pub fn complete(&mut self) -> Option<(Responder, Reply, bool)> {
        if self.state != ResultState::Pending {
            return None;
        }
        let responder = self.responder.take()?;
        self.state = ResultState::Replied;
        Some((responder, self.snapshot(), self.release_context))
    }

    /// Drop the responder so a late reply is a no-op
    pub fn abandon(&mut self) {
        if self.state == ResultState::Pending {
            self.state = ResultState::Abandoned;
        }
        self.responder = None;
    }

    fn snapshot(&self) -> Reply {
        let convert = |node: &Option<JsonRef>| {
            node.as_ref().map(|n| {
                json::to_value(n).unwrap_or_else(|e| json!({ "message": e.to_string() }))
            })
        };
        Reply {
            seq: self.seq.clone(),
            source: self.source.clone(),
            data: convert(&self.data),
            err: convert(&self.err),
            headers: self.headers.clone(),
            bytes: self.bytes.clone(),
        }
    }
}

/// Normalize any error value to `{name, message, code, location}`
pub fn structured_error(err: &Value) -> Value {
    let field = |key: &str| err.get(key).cloned().unwrap_or(Value::Null);
    match err {
        Value::Object(_) => json!({
            "name": err.get("name").or_else(|| err.get("type")).cloned().unwrap_or_else(|| json!("Error")),
            "message": field("message"),
            "code": field("code"),
            "location": field("location"),
        }),
        Value::String(message) => json!({
            "name": "Error",
            "message": message,
            "code": Value::Null,
            "location": Value::Null,
        }),
        other => json!({
            "name": "Error",
            "message": other.to_string(),
            "code": Value::Null,
            "location": Value::Null,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::bus::LocalBus;
    use std::cell::Cell;

    fn message(uri: &str) -> Rc<Message> {
        Rc::new(Message::parse(uri, None).unwrap())
    }

    #[test]
    fn test_result_copies_seq_and_source() {
        let result = IpcResult::new(8, Some(message("ipc://echo?seq=R1")));
        assert_eq!(result.seq, "R1");
        assert_eq!(result.source, "echo");

        let unsequenced = IpcResult::new(8, Some(message("ipc://echo")));
        assert_eq!(unsequenced.seq, BROADCAST_SEQ);
    }

    #[test]
    fn test_complete_runs_once() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let mut result = IpcResult::new(8, Some(message("ipc://echo?seq=2")));
        result.claim(Responder::Host(Box::new(move |_| seen.set(seen.get() + 1))), true);
        result.data = Some(json::from_value(&json!(5)));

        let (responder, reply, release) = result.complete().unwrap();
        assert!(release);
        assert_eq!(reply.data, Some(json!(5)));
        assert_eq!(responder.deliver(reply), None);
        assert!(result.complete().is_none());
        assert_eq!(calls.get(), 1);
        assert_eq!(result.state(), ResultState::Replied);
    }

    #[test]
    fn test_abandoned_result_never_replies() {
        let mut result = IpcResult::new(8, None);
        result.claim(Responder::Module { callback: 3 }, false);
        result.abandon();
        assert!(result.complete().is_none());
        assert_eq!(result.state(), ResultState::Abandoned);
    }

    #[test]
    fn test_bus_delivery_by_seq() {
        let bus = Rc::new(LocalBus::new());

        let mut broadcast = IpcResult::new(8, Some(message("ipc://tick?seq=-1")));
        broadcast.claim(Responder::Bus(bus.clone()), false);
        broadcast.data = Some(json::from_value(&json!({"n": 1})));
        let (responder, reply, _) = broadcast.complete().unwrap();
        responder.deliver(reply);

        let mut request = IpcResult::new(8, Some(message("ipc://tick?seq=9")));
        request.claim(Responder::Bus(bus.clone()), false);
        let (responder, reply, _) = request.complete().unwrap();
        responder.deliver(reply);

        assert_eq!(
            bus.events(),
            vec![(DEFAULT_EVENT.to_string(), json!({"source": "tick", "data": {"n": 1}}))]
        );
        assert_eq!(bus.resolved().len(), 1);
        assert_eq!(bus.resolved()[0].seq, "9");
    }

    #[test]
    fn test_set_json_unpacks_envelope() {
        let mut result = IpcResult::new(8, None);
        result.set_json(json::from_value(&json!({"err": {"message": "bad"}})));
        assert!(result.data.is_none());
        assert_eq!(json::to_value(result.err.as_ref().unwrap()).unwrap(), json!({"message": "bad"}));

        let mut plain = IpcResult::new(8, None);
        plain.set_json(json::from_value(&json!([1, 2])));
        assert_eq!(json::to_value(plain.data.as_ref().unwrap()).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut result = IpcResult::new(8, None);
        result.set_header("Content-Type", "text/plain");
        result.set_header("content-type", "application/json");
        assert_eq!(result.headers.len(), 1);
        assert_eq!(result.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_structured_error() {
        assert_eq!(
            structured_error(&json!({"type": "NotFoundError", "message": "gone", "code": "ENOENT"})),
            json!({"name": "NotFoundError", "message": "gone", "code": "ENOENT", "location": null})
        );
        assert_eq!(structured_error(&json!("boom"))["message"], json!("boom"));
    }
}

//! Request/response protocol
//!
//! Messages are `ipc://` URIs with optional bytes. Results answer them and
//! are delivered to a responder: a host closure, a module callback, or the
//! host bus. The router decides which handler sees a message.

pub mod bus;
pub mod message;
pub mod result;
pub mod router;

pub use bus::{BusError, BusResponse, DEFAULT_EVENT, HostBus, LocalBus};
pub use message::Message;
pub use result::{BROADCAST_SEQ, IpcResult, Reply, Responder, ResultRef, ResultState};
pub use router::{Handler, HostHandler, Router};

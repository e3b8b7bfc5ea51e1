//! extension-bridge - sandboxed WebAssembly extensions over a host request bus
//!
//! Extensions are C-ABI WebAssembly modules. The bridge validates and
//! instantiates them, gives them a C runtime over their own linear memory,
//! and connects their routes and events to the native host:
//!
//! - `extension`: ABI, adapter, loader, registry and bindings
//! - `ipc`: messages, results, the router and the host bus
//! - `platform`: scheduling and console output for browser or native
//!
//! Platform support:
//! - Browser (wasm32-unknown-unknown): `WebAssembly.instantiate`, `setTimeout`
//! - Native: `NativeModule` instances driven by a local executor, for tests
//!   and embedding

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod extension;
pub mod ipc;
pub mod platform;

pub use extension::{
    Adapter, Binding, Extension, ExtensionError, ExtensionRegistry, ExtensionResult, LoadOptions,
    Loader, RequestDescriptor,
};
pub use ipc::{HostBus, LocalBus};

/// Install logging and the panic hook. This is the WASM entry point.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn main() {
    platform::web::init(log::LevelFilter::Info);
    log::debug!("extension bridge ready");
}

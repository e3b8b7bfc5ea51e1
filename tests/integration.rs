//! Integration tests for the extension bridge
//!
//! Tests drive the full load pipeline over an in-process `LocalBus`: type
//! and stats queries, byte fetch, validation, instantiation of a registered
//! native module, initialization, then calls through bindings.

use extension_bridge::extension::abi::{NULL, export_kind, exports, globals};
use extension_bridge::extension::{
    Adapter, ExtensionError, ExtensionKind, ExtensionRegistry, Fault, LoadOptions, LoadStage,
    Loader, NativeModule, RequestDescriptor, Value, Verb,
};
use extension_bridge::ipc::{BusResponse, LocalBus};
use extension_bridge::platform::CapturedConsole;
use futures::executor::block_on;
use serde_json::json;
use std::rc::Rc;

const ECHO_PATH: &str = "/ext/echo.wasm";

struct Host {
    bus: Rc<LocalBus>,
    console: Rc<CapturedConsole>,
    loader: Loader,
}

fn bare_host() -> Host {
    let bus = Rc::new(LocalBus::new());
    let console = Rc::new(CapturedConsole::new());
    let loader = Loader::new(bus.clone(), console.clone());
    Host {
        bus,
        console,
        loader,
    }
}

/// A module binary exporting the given `(name, kind)` entries
fn module_bytes(entries: &[(&str, u8)]) -> Vec<u8> {
    let mut section = vec![entries.len() as u8];
    for (name, kind) in entries {
        section.push(name.len() as u8);
        section.extend_from_slice(name.as_bytes());
        section.push(*kind);
        section.push(0);
    }

    let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    bytes.push(7);
    let len = section.len() as u32;
    bytes.push((len & 0x7f) as u8 | 0x80);
    bytes.push((len >> 7) as u8);
    bytes.extend(section);
    bytes
}

fn abi_module_bytes() -> Vec<u8> {
    let mut entries: Vec<(&str, u8)> = exports::FUNCTIONS
        .iter()
        .map(|name| (*name, export_kind::FUNCTION))
        .collect();
    entries.extend(globals::ALL.iter().map(|name| (*name, export_kind::GLOBAL)));
    entries.push((exports::TABLE, export_kind::TABLE));
    module_bytes(&entries)
}

/// Answer `extension.type` and `extension.stats` for one wasm extension
fn publish(bus: &LocalBus, name: &str, kind: &str, path: &str) {
    let (type_name, type_kind) = (name.to_string(), kind.to_string());
    bus.handle("extension.type", move |params| {
        if params["name"] == json!(type_name) {
            BusResponse::data(json!({"name": type_name, "type": type_kind}))
        } else {
            BusResponse::error(json!({"type": "NotFoundError", "message": "unknown extension"}))
        }
    });
    let path = path.to_string();
    bus.handle("extension.stats", move |_| {
        BusResponse::data(json!({"abi": 1, "path": path, "loaded": 0}))
    });
}

fn arg(args: &[Value], index: usize) -> u32 {
    args.get(index).and_then(Value::as_u32).unwrap_or(NULL)
}

/// Replies with its `value` parameter; `quit` exits with status 2
fn echo_module() -> NativeModule {
    let mut builder = NativeModule::builder();
    builder.metadata("echo", "0.1.0", "echoes its value");

    let echo = builder.function(|adapter: &Adapter, args: &[Value]| {
        let (ctx, message) = (arg(args, 0), arg(args, 1));
        let sapi = adapter.sapi();
        let value = sapi.ipc_message_get_value(message)?;
        let json = sapi.json_raw_from(ctx, value)?;
        let result = sapi.ipc_result_create(ctx, message)?;
        sapi.ipc_result_set_json(result, json)?;
        sapi.ipc_reply(result)?;
        Ok(None)
    });
    let quit = builder.function(|adapter: &Adapter, _: &[Value]| {
        adapter.libc().exit(2)?;
        Ok(None)
    });
    let echo_route = builder.string("echo");
    let quit_route = builder.string("quit");

    builder.initializer(move |adapter, ctx| {
        let sapi = adapter.sapi();
        Ok(sapi.ipc_router_map(ctx, echo_route, echo, 0)?
            && sapi.ipc_router_map(ctx, quit_route, quit, 0)?)
    });
    builder.build()
}

/// A host with the echo extension published and registered
fn echo_host() -> Host {
    let host = bare_host();
    publish(&host.bus, "echo", "wasm32", ECHO_PATH);
    host.bus.serve_file("ext/echo.wasm", abi_module_bytes());
    host.loader.register_native("echo", echo_module);
    host
}

fn load_error(result: Result<extension_bridge::Extension, extension_bridge::extension::LoadError>) -> LoadStage {
    result.expect_err("load should fail").stage
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_wasm_extension() {
    let host = echo_host();
    let extension = block_on(host.loader.load("echo", LoadOptions::allowing(["ipc"]))).unwrap();

    assert_eq!(extension.kind(), ExtensionKind::Wasm);
    assert!(extension.is_loaded());
    assert_eq!(extension.info().name, "echo");
    assert_eq!(extension.info().version, "0.1.0");
    assert_eq!(extension.stats().path, ECHO_PATH);
    assert!(extension.adapter().is_some());
}

#[test]
fn test_load_options_from_json() {
    let host = echo_host();
    let options = LoadOptions::from_json(r#"{"allow": "ipc, fs", "memoryPages": 8}"#).unwrap();
    let extension = block_on(host.loader.load("echo", options)).unwrap();

    let adapter = extension.adapter().unwrap();
    let root = adapter.root_context();
    let state = adapter.state();
    assert!(state.contexts.is_allowed(root, "fs_read_file"));
    assert!(!state.contexts.is_allowed(root, "net_connect"));
    assert_eq!(state.memory.pages(), 8);
}

#[test]
fn test_load_fails_at_each_stage() {
    // type query
    let host = bare_host();
    host.bus.handle("extension.type", |_| BusResponse::data(json!({"type": "python"})));
    assert_eq!(load_error(block_on(host.loader.load("x", LoadOptions::default()))), LoadStage::TypeQuery);

    // stats query
    let host = bare_host();
    host.bus.handle("extension.type", |_| BusResponse::data(json!({"type": "wasm32"})));
    assert_eq!(load_error(block_on(host.loader.load("x", LoadOptions::default()))), LoadStage::Stats);

    // byte fetch
    let host = bare_host();
    publish(&host.bus, "echo", "wasm32", ECHO_PATH);
    assert_eq!(
        load_error(block_on(host.loader.load("echo", LoadOptions::default()))),
        LoadStage::ByteFetch
    );

    // validation
    let host = bare_host();
    publish(&host.bus, "echo", "wasm32", ECHO_PATH);
    host.bus.serve_file("ext/echo.wasm", module_bytes(&[(exports::ABI, export_kind::FUNCTION)]));
    assert_eq!(
        load_error(block_on(host.loader.load("echo", LoadOptions::default()))),
        LoadStage::Validate
    );

    // instantiation
    let host = bare_host();
    publish(&host.bus, "echo", "wasm32", ECHO_PATH);
    host.bus.serve_file("ext/echo.wasm", abi_module_bytes());
    assert_eq!(
        load_error(block_on(host.loader.load("echo", LoadOptions::default()))),
        LoadStage::Instantiation
    );
}

#[test]
fn test_initializer_failure_is_reported() {
    let host = echo_host();
    // without the ipc policy the routes cannot be mapped and the entry declines
    let err = block_on(host.loader.load("echo", LoadOptions::default())).unwrap_err();
    assert_eq!(err.stage, LoadStage::Initializer);
    assert_eq!(err.name, "echo");
}

#[test]
fn test_initializer_exit_is_reported() {
    let host = echo_host();
    host.loader.register_native("echo", || {
        let mut builder = NativeModule::builder();
        builder
            .metadata("echo", "0.1.0", "")
            .initializer(|adapter, _| {
                adapter.libc().exit(9)?;
                Ok(true)
            });
        builder.build()
    });

    let err = block_on(host.loader.load("echo", LoadOptions::allowing(["ipc"]))).unwrap_err();
    assert_eq!(err.stage, LoadStage::Initializer);
    assert!(err.reason.contains("status 9"));
}

// ============================================================================
// Bindings
// ============================================================================

#[test]
fn test_binding_request_round_trip() {
    let host = echo_host();
    let extension = block_on(host.loader.load("echo", LoadOptions::allowing(["ipc"]))).unwrap();
    let binding = extension.binding().unwrap();

    let response = block_on(binding.call(RequestDescriptor::new("echo").param("value", 5))).unwrap();
    assert_eq!(response.data, Some(json!(5)));

    let response = block_on(
        binding.call(RequestDescriptor::new("echo").param("value", json!({"a": [1, 2]}))),
    )
    .unwrap();
    assert_eq!(response.data, Some(json!({"a": [1, 2]})));
}

#[test]
fn test_binding_without_reply_and_unknown_routes() {
    let host = echo_host();
    let extension = block_on(host.loader.load("echo", LoadOptions::allowing(["ipc"]))).unwrap();
    let binding = extension.binding().unwrap();

    let sent = block_on(binding.call(RequestDescriptor::new("echo").param("value", 1).verb(Verb::Send)))
        .unwrap();
    assert_eq!(sent, BusResponse::default());

    let missing = block_on(binding.call(RequestDescriptor::new("missing")));
    assert_eq!(missing, Err(ExtensionError::NoRoute("missing".to_string())));
}

#[test]
fn test_binding_emit_reaches_host() {
    let host = echo_host();
    let extension = block_on(host.loader.load("echo", LoadOptions::allowing(["ipc"]))).unwrap();
    let binding = extension.binding().unwrap();

    block_on(binding.call(RequestDescriptor::new("tick").param("n", 1).verb(Verb::Emit))).unwrap();
    assert_eq!(host.bus.events(), vec![("tick".to_string(), json!({"n": 1}))]);
}

#[test]
fn test_exit_inside_a_route_tears_down() {
    let host = echo_host();
    let extension = block_on(host.loader.load("echo", LoadOptions::allowing(["ipc"]))).unwrap();
    let binding = extension.binding().unwrap();

    let result = block_on(binding.call(RequestDescriptor::new("quit")));
    assert_eq!(result, Err(ExtensionError::Fault(Fault::Exit(2))));
    assert_eq!(extension.adapter().unwrap().exit_status(), Some(2));

    let after = block_on(binding.call(RequestDescriptor::new("echo").param("value", 1)));
    assert_eq!(after, Err(ExtensionError::Destroyed));
}

#[test]
fn test_binding_refused_after_unload() {
    let host = echo_host();
    let mut extension = block_on(host.loader.load("echo", LoadOptions::allowing(["ipc"]))).unwrap();
    let binding = extension.binding().unwrap();

    assert!(block_on(extension.unload()).unwrap());
    assert!(!extension.is_loaded());
    assert!(matches!(extension.binding(), Err(ExtensionError::NotOpen(_))));
    assert_eq!(
        block_on(binding.call(RequestDescriptor::new("echo"))),
        Err(ExtensionError::Destroyed)
    );
    assert!(matches!(block_on(extension.unload()), Err(ExtensionError::NotOpen(_))));
}

// ============================================================================
// Shared Extensions
// ============================================================================

fn shared_host() -> Host {
    let host = bare_host();
    publish(&host.bus, "math", "shared", "/lib/libmath.so");
    host.bus.handle("extension.load", |params| {
        BusResponse::data(json!({"abi": 1, "name": params["name"], "version": "2.0.0"}))
    });
    host.bus.handle("extension.unload", |_| BusResponse::data(json!(true)));
    host.bus.handle("math.add", |params| {
        let a = params["a"].as_i64().unwrap_or(0);
        let b = params["b"].as_i64().unwrap_or(0);
        BusResponse::data(json!(a + b))
    });
    host
}

#[test]
fn test_shared_extension_proxies_over_bus() {
    let host = shared_host();
    let mut extension = block_on(host.loader.load("math", LoadOptions::allowing(["ipc"]))).unwrap();
    assert_eq!(extension.kind(), ExtensionKind::Shared);
    assert_eq!(extension.info().version, "2.0.0");
    assert!(extension.adapter().is_none());

    let binding = extension.binding().unwrap();
    let response = block_on(binding.call(
        RequestDescriptor::new("add").params(json!({"a": 2, "b": 40})),
    ))
    .unwrap();
    assert_eq!(response.data, Some(json!(42)));

    assert!(block_on(extension.unload()).unwrap());
}

#[test]
fn test_shared_load_failure() {
    let host = bare_host();
    publish(&host.bus, "math", "shared", "/lib/libmath.so");
    host.bus.handle("extension.load", |_| {
        BusResponse::error(json!({"message": "symbol not found"}))
    });

    let err = block_on(host.loader.load("math", LoadOptions::default())).unwrap_err();
    assert_eq!(err.stage, LoadStage::Instantiation);
    assert_eq!(err.reason, "symbol not found");
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_registry_open_and_close() {
    let host = echo_host();
    let console = host.console.clone();
    let mut registry = ExtensionRegistry::new(host.loader);

    let opened = block_on(registry.open("echo", LoadOptions::allowing(["ipc"]))).unwrap();
    assert_eq!(opened.name(), "echo");
    assert!(registry.is_open("echo"));
    assert_eq!(registry.names(), vec!["echo".to_string()]);

    let again = block_on(registry.open("echo", LoadOptions::allowing(["ipc"])));
    assert!(matches!(again, Err(ExtensionError::AlreadyOpen(_))));

    let binding = registry.binding("echo").unwrap();
    let response = block_on(binding.call(RequestDescriptor::new("echo").param("value", 7))).unwrap();
    assert_eq!(response.data, Some(json!(7)));

    block_on(registry.close("echo")).unwrap();
    assert!(registry.is_empty());
    assert_eq!(
        block_on(registry.close("echo")),
        Err(ExtensionError::NotOpen("echo".to_string()))
    );
    assert!(matches!(registry.binding("echo"), Err(ExtensionError::NotOpen(_))));
    assert!(console.lines().is_empty());
}

#[test]
fn test_registry_native_modules() {
    let host = bare_host();
    let mut registry = ExtensionRegistry::new(host.loader);

    registry
        .open_native("echo", echo_module(), LoadOptions::allowing(["ipc"]))
        .unwrap();
    assert!(matches!(
        registry.open_native("echo", echo_module(), LoadOptions::allowing(["ipc"])),
        Err(ExtensionError::AlreadyOpen(_))
    ));
    assert_eq!(registry.get("echo").unwrap().stats().abi, 1);

    let shared = shared_host();
    let mut other = ExtensionRegistry::new(shared.loader);
    block_on(other.open("math", LoadOptions::default())).unwrap();
    assert_eq!(other.len(), 1);

    block_on(registry.close_all()).unwrap();
    block_on(other.close_all()).unwrap();
    assert!(registry.is_empty() && other.is_empty());
}

//! Browser tests, run with `wasm-pack test --headless --firefox`

#![cfg(target_arch = "wasm32")]

use extension_bridge::extension::{Heap, LinearMemory, PolicySet};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn js_memory(pages: u32) -> LinearMemory {
    let descriptor = js_sys::Object::new();
    js_sys::Reflect::set(&descriptor, &"initial".into(), &pages.into()).unwrap();
    LinearMemory::new(js_sys::WebAssembly::Memory::new(&descriptor).unwrap())
}

#[wasm_bindgen_test]
fn test_js_memory_strings() {
    let mut memory = js_memory(1);
    assert_eq!(memory.size(), 65536);

    memory.write_cstring(128, b"hello").unwrap();
    assert_eq!(memory.read_cstring(128).unwrap().as_deref(), Some("hello"));
    assert_eq!(memory.read(128, 6).unwrap(), b"hello\0");
    assert!(memory.read(65530, 16).is_err());
}

#[wasm_bindgen_test]
fn test_heap_over_js_memory() {
    let memory = js_memory(2);
    let mut heap = Heap::new(1024, memory.size());

    let a = heap.alloc(100);
    let b = heap.alloc(100);
    assert_ne!(a, 0);
    assert_ne!(a, b);
    assert!(heap.free(a));
    assert!(!heap.free(a));
    assert_eq!(heap.allocation_count(), 1);
}

#[wasm_bindgen_test]
fn test_policy_prefixes() {
    let mut policies = PolicySet::allowing(["ipc"]);
    policies.set("ipc_router", false);

    assert!(policies.is_allowed("ipc_emit"));
    assert!(!policies.is_allowed("ipc_router_map"));
    assert!(!policies.is_allowed("fs_read"));
    assert!(PolicySet::new().decide("ipc").is_none());
}

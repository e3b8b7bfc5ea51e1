//! Browser WebAssembly instances

use super::{ModuleInstance, Value};
use crate::extension::abi::exports;
use crate::extension::adapter::Adapter;
use crate::extension::error::Fault;
use js_sys::{Array, BigInt, Function, Object, Reflect, Uint8Array, WebAssembly};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// A compiled and instantiated sandbox module
pub struct WebAssemblyInstance {
    exports: Object,
    table: WebAssembly::Table,
}

impl WebAssemblyInstance {
    /// Compile and instantiate `bytes` against an import object
    pub async fn instantiate(bytes: &[u8], imports: &Object) -> Result<Self, String> {
        let array = Uint8Array::new_with_length(bytes.len() as u32);
        array.copy_from(bytes);

        let promise = WebAssembly::compile(&array.buffer());
        let module = wasm_bindgen_futures::JsFuture::from(promise)
            .await
            .map_err(|e| describe(&e, "compilation failed"))?
            .dyn_into::<WebAssembly::Module>()
            .map_err(|_| "failed to cast to Module".to_string())?;

        let promise = WebAssembly::instantiate_module(&module, imports);
        let instance = wasm_bindgen_futures::JsFuture::from(promise)
            .await
            .map_err(|e| describe(&e, "instantiation failed"))?
            .dyn_into::<WebAssembly::Instance>()
            .map_err(|_| "failed to cast to Instance".to_string())?;

        let exports = instance.exports();
        let table = Reflect::get(&exports, &JsValue::from_str(exports::TABLE))
            .ok()
            .and_then(|t| t.dyn_into::<WebAssembly::Table>().ok())
            .ok_or_else(|| format!("missing export '{}'", exports::TABLE))?;

        Ok(Self { exports, table })
    }

    fn function(&self, name: &str) -> Option<Function> {
        Reflect::get(&self.exports, &JsValue::from_str(name))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
    }
}

impl ModuleInstance for WebAssemblyInstance {
    fn global(&self, name: &str) -> Option<u32> {
        let global = Reflect::get(&self.exports, &JsValue::from_str(name))
            .ok()?
            .dyn_into::<WebAssembly::Global>()
            .ok()?;
        global.value().as_f64().map(|v| v as u32)
    }

    fn has_export(&self, name: &str) -> bool {
        Reflect::has(&self.exports, &JsValue::from_str(name)).unwrap_or(false)
    }

    fn call_export(
        &self,
        adapter: &Adapter,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>, Fault> {
        let function = self
            .function(name)
            .ok_or_else(|| Fault::Trap(format!("missing export '{name}'")))?;
        apply(adapter, &function, args)
    }

    fn table_len(&self) -> u32 {
        self.table.length()
    }

    fn call_indirect(
        &self,
        adapter: &Adapter,
        index: u32,
        args: &[Value],
    ) -> Result<Option<Value>, Fault> {
        let Ok(slot) = self.table.get(index) else {
            return Ok(None);
        };
        if slot.is_null() {
            return Ok(None);
        }
        apply(adapter, &slot, args)
    }
}

/// Call into the module; a thrown error becomes the fault an import
/// recorded, or a trap
fn apply(adapter: &Adapter, function: &Function, args: &[Value]) -> Result<Option<Value>, Fault> {
    let values: Array = args.iter().map(to_js).collect();
    match function.apply(&JsValue::NULL, &values) {
        Ok(value) => Ok(from_js(&value)),
        Err(err) => Err(adapter
            .take_fault()
            .unwrap_or_else(|| Fault::Trap(describe(&err, "module trapped")))),
    }
}

fn to_js(value: &Value) -> JsValue {
    match *value {
        Value::I32(v) => JsValue::from(v),
        Value::I64(v) => BigInt::from(v).into(),
        Value::F64(v) => JsValue::from(v),
    }
}

fn from_js(value: &JsValue) -> Option<Value> {
    if value.is_undefined() {
        return None;
    }
    if value.is_bigint() {
        return i64::try_from(value.clone()).ok().map(Value::I64);
    }
    let number = value.as_f64()?;
    if number.fract() == 0.0 && number >= i32::MIN as f64 && number <= i32::MAX as f64 {
        Some(Value::I32(number as i32))
    } else {
        Some(Value::F64(number))
    }
}

fn describe(err: &JsValue, fallback: &str) -> String {
    err.as_string()
        .or_else(|| {
            err.dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| fallback.to_string())
}

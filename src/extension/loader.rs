//! Extension Loader
//!
//! Loading runs in stages, and a failure at any of them is reported as a
//! `LoadError` naming that stage:
//!
//! 1. type query over the host bus (`extension.type`)
//! 2. stats query (`extension.stats`), giving the module path
//! 3. byte fetch through the bus
//! 4. validation of the export section
//! 5. instantiation against the `env` imports
//! 6. the module initializer
//!
//! Shared extensions live in the native host, so for them the loader only
//! asks the host to load them (`extension.load`). An `Extension` is only
//! handed out once its adapter has initialized; a module that fails part way
//! is torn down first.

use super::abi::{ABI_VERSION, exports, export_kind, globals};
use super::adapter::{Adapter, AdapterOptions, ExtensionInfo};
use super::binding::{Binding, BindingOptions};
use super::context::PolicySet;
use super::error::{ExtensionError, ExtensionResult, LoadError, LoadStage, ModuleError};
use super::instance::NativeModule;
use super::memory::LinearMemory;
use crate::ipc::bus::HostBus;
use crate::platform::ConsoleSink;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// WASM magic number: \0asm
const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// WASM version 1
const WASM_VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Export section id
const EXPORT_SECTION: u8 = 7;

/// Pages of linear memory given to a module unless configured otherwise
pub const DEFAULT_MEMORY_PAGES: u32 = 32;

/// One entry of a module's export section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleExport {
    pub name: String,
    pub kind: u8,
    pub index: u32,
}

/// Checks module bytes against the extension ABI before instantiation
pub struct ModuleValidator;

impl ModuleValidator {
    /// Validate a module binary, returning its exports
    ///
    /// Every entry of `exports::FUNCTIONS` must be a function export, the
    /// layout globals must be global exports, and the indirect function
    /// table must be exported.
    pub fn validate(bytes: &[u8]) -> Result<Vec<ModuleExport>, ModuleError> {
        let found = Self::exports(bytes)?;
        let has = |name: &str, kind: u8| found.iter().any(|e| e.name == name && e.kind == kind);

        for name in exports::FUNCTIONS {
            if !has(name, export_kind::FUNCTION) {
                return Err(ModuleError::MissingExport {
                    name,
                    kind: "function",
                });
            }
        }
        for name in globals::ALL {
            if !has(name, export_kind::GLOBAL) {
                return Err(ModuleError::MissingExport { name, kind: "global" });
            }
        }
        if !has(exports::TABLE, export_kind::TABLE) {
            return Err(ModuleError::MissingExport {
                name: exports::TABLE,
                kind: "table",
            });
        }

        Ok(found)
    }

    /// Walk the sections and collect the export section's entries
    pub fn exports(bytes: &[u8]) -> Result<Vec<ModuleExport>, ModuleError> {
        if bytes.len() < 8 {
            return Err(ModuleError::TooSmall);
        }
        if bytes[0..4] != WASM_MAGIC {
            return Err(ModuleError::BadMagic);
        }
        if bytes[4..8] != WASM_VERSION {
            return Err(ModuleError::BadVersion);
        }

        let mut found = Vec::new();
        let mut offset = 8;
        while offset < bytes.len() {
            let section_id = bytes[offset];
            offset += 1;

            let (size, size_bytes) = read_leb128(&bytes[offset..])?;
            offset += size_bytes;

            let section_end = offset
                .checked_add(size as usize)
                .filter(|end| *end <= bytes.len())
                .ok_or(ModuleError::Truncated("section"))?;

            if section_id == EXPORT_SECTION {
                found.extend(parse_export_section(&bytes[offset..section_end])?);
            }

            offset = section_end;
        }

        Ok(found)
    }
}

/// Read an unsigned LEB128 value, returning it with its encoded length
fn read_leb128(bytes: &[u8]) -> Result<(u32, usize), ModuleError> {
    let mut result = 0u32;
    let mut shift = 0;

    for (i, &byte) in bytes.iter().take(5).enumerate() {
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }

    Err(ModuleError::InvalidLeb128)
}

fn parse_export_section(data: &[u8]) -> Result<Vec<ModuleExport>, ModuleError> {
    let mut found = Vec::new();
    if data.is_empty() {
        return Ok(found);
    }

    let (count, mut offset) = read_leb128(data)?;
    for _ in 0..count {
        let (name_len, len_bytes) = read_leb128(&data[offset..])?;
        offset += len_bytes;

        let name_end = offset
            .checked_add(name_len as usize)
            .filter(|end| *end <= data.len())
            .ok_or(ModuleError::Truncated("export name"))?;
        let name = String::from_utf8_lossy(&data[offset..name_end]).into_owned();
        offset = name_end;

        let Some(&kind) = data.get(offset) else {
            return Err(ModuleError::Truncated("export entry"));
        };
        offset += 1;

        let (index, index_bytes) = read_leb128(&data[offset..])?;
        offset += index_bytes;

        found.push(ModuleExport { name, kind, index });
    }

    Ok(found)
}

/// Where an extension runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionKind {
    /// Native code inside the host process, reached over the bus
    #[serde(rename = "shared")]
    Shared,
    /// A sandboxed WebAssembly module driven by an adapter
    #[serde(rename = "wasm32")]
    Wasm,
}

impl ExtensionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shared" => Some(Self::Shared),
            "wasm32" => Some(Self::Wasm),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Wasm => "wasm32",
        }
    }
}

/// What the host knows about an extension before it is loaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionStats {
    pub abi: u32,
    pub path: String,
    pub loaded: u32,
}

/// Load-time configuration, usually read from JSON
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Capabilities granted to the root context; a comma-separated string
    /// or a list
    #[serde(deserialize_with = "deserialize_allow")]
    pub allow: Vec<String>,
    #[serde(alias = "memoryPages")]
    pub memory_pages: u32,
    pub env: BTreeMap<String, String>,
    pub config: BTreeMap<String, String>,
    pub binding: BindingOptions,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            memory_pages: DEFAULT_MEMORY_PAGES,
            env: BTreeMap::new(),
            config: BTreeMap::new(),
            binding: BindingOptions::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Allow {
    List(Vec<String>),
    Joined(String),
}

fn deserialize_allow<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let names = match Allow::deserialize(deserializer)? {
        Allow::List(names) => names,
        Allow::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };
    Ok(names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

impl LoadOptions {
    pub fn from_json(text: &str) -> ExtensionResult<Self> {
        serde_json::from_str(text).map_err(|err| ExtensionError::Options(err.to_string()))
    }

    pub fn allowing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allow: names.into_iter().map(|n| n.as_ref().to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            policies: PolicySet::allowing(&self.allow),
            env: self.env.clone(),
            config: self.config.clone(),
        }
    }

    /// Parameters of `extension.load` for a shared extension
    fn bus_params(&self, name: &str) -> Value {
        json!({
            "name": name,
            "allow": self.allow.join(","),
        })
    }
}

/// A loaded extension
pub struct Extension {
    name: String,
    kind: ExtensionKind,
    info: ExtensionInfo,
    stats: ExtensionStats,
    options: LoadOptions,
    adapter: Option<Adapter>,
    bus: Rc<dyn HostBus>,
    loaded: bool,
}

impl Extension {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExtensionKind {
        self.kind
    }

    pub fn info(&self) -> &ExtensionInfo {
        &self.info
    }

    pub fn stats(&self) -> &ExtensionStats {
        &self.stats
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// The adapter of a sandboxed extension
    pub fn adapter(&self) -> Option<&Adapter> {
        self.adapter.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn binding(&self) -> ExtensionResult<Binding> {
        if !self.loaded {
            return Err(ExtensionError::NotOpen(self.name.clone()));
        }
        let options = self.options.binding.clone();
        Ok(match (&self.adapter, self.kind) {
            (Some(adapter), ExtensionKind::Wasm) => Binding::sandboxed(adapter.clone(), options),
            _ => Binding::shared(Rc::clone(&self.bus), &self.name, options),
        })
    }

    /// Unload; shared extensions are unloaded by the host
    pub async fn unload(&mut self) -> ExtensionResult<bool> {
        if !self.loaded {
            return Err(ExtensionError::NotOpen(self.name.clone()));
        }

        match self.kind {
            ExtensionKind::Shared => {
                let response = self
                    .bus
                    .request("extension.unload", json!({ "name": self.name }))
                    .await;
                if let Some(err) = response.err {
                    return Err(ExtensionError::Bus(describe(&err)));
                }
            }
            ExtensionKind::Wasm => {
                if let Some(adapter) = self.adapter.take() {
                    adapter.destroy();
                }
            }
        }

        self.loaded = false;
        log::info!("unloaded extension '{}'", self.name);
        Ok(true)
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("info", &self.info)
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}

/// Produces the native stand-in for a module
pub type NativeFactory = Rc<dyn Fn() -> NativeModule>;

/// Loads extensions over a host bus
pub struct Loader {
    bus: Rc<dyn HostBus>,
    console: Rc<dyn ConsoleSink>,
    natives: RefCell<HashMap<String, NativeFactory>>,
}

impl Loader {
    pub fn new(bus: Rc<dyn HostBus>, console: Rc<dyn ConsoleSink>) -> Self {
        Self {
            bus,
            console,
            natives: RefCell::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> Rc<dyn HostBus> {
        Rc::clone(&self.bus)
    }

    /// Run `name` as a native module once its bytes have validated
    ///
    /// Without a browser engine this is the only way a `wasm32` extension
    /// can be instantiated.
    pub fn register_native(&self, name: &str, factory: impl Fn() -> NativeModule + 'static) {
        self.natives
            .borrow_mut()
            .insert(name.to_string(), Rc::new(factory));
    }

    /// Ask the host what kind of extension `name` is
    pub async fn kind(&self, name: &str) -> Result<ExtensionKind, LoadError> {
        let response = self
            .bus
            .request("extension.type", json!({ "name": name }))
            .await;
        if let Some(err) = response.err {
            return Err(LoadError::new(name, LoadStage::TypeQuery, describe(&err)));
        }

        let kind = response
            .data
            .as_ref()
            .and_then(|data| data.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        ExtensionKind::from_name(kind).ok_or_else(|| {
            LoadError::new(name, LoadStage::TypeQuery, format!("unknown extension type '{kind}'"))
        })
    }

    pub async fn stats(&self, name: &str) -> Result<ExtensionStats, LoadError> {
        let response = self
            .bus
            .request("extension.stats", json!({ "name": name }))
            .await;
        if let Some(err) = response.err {
            return Err(LoadError::new(name, LoadStage::Stats, describe(&err)));
        }

        match response.data {
            Some(Value::Null) | None => Err(LoadError::new(name, LoadStage::Stats, "no stats")),
            Some(data) => serde_json::from_value(data)
                .map_err(|err| LoadError::new(name, LoadStage::Stats, err.to_string())),
        }
    }

    pub async fn load(&self, name: &str, options: LoadOptions) -> Result<Extension, LoadError> {
        let kind = self.kind(name).await?;
        let stats = self.stats(name).await?;

        if kind == ExtensionKind::Shared {
            return self.load_shared(name, stats, options).await;
        }

        let path = stats.path.strip_prefix('/').unwrap_or(&stats.path);
        let bytes = self
            .bus
            .fetch(path)
            .await
            .map_err(|err| LoadError::new(name, LoadStage::ByteFetch, err.to_string()))?;

        ModuleValidator::validate(&bytes)
            .map_err(|err| LoadError::new(name, LoadStage::Validate, err.to_string()))?;

        let adapter = self.instantiate(name, &bytes, &options).await?;
        let info = initialize(name, &adapter)?;
        if stats.abi != 0 && stats.abi != info.abi {
            log::warn!(
                "extension '{name}' reports ABI {} but the host expected {}",
                info.abi,
                stats.abi
            );
        }

        log::info!("loaded extension '{name}' ({})", kind.name());
        Ok(Extension {
            name: name.to_string(),
            kind,
            info,
            stats,
            options,
            adapter: Some(adapter),
            bus: Rc::clone(&self.bus),
            loaded: true,
        })
    }

    /// Load a native module directly, skipping the bus stages
    pub fn load_native(
        &self,
        name: &str,
        module: NativeModule,
        options: LoadOptions,
    ) -> Result<Extension, LoadError> {
        let adapter = self.native_adapter(module, &options);
        let info = initialize(name, &adapter)?;

        Ok(Extension {
            name: name.to_string(),
            kind: ExtensionKind::Wasm,
            info,
            stats: ExtensionStats {
                abi: ABI_VERSION,
                ..ExtensionStats::default()
            },
            options,
            adapter: Some(adapter),
            bus: Rc::clone(&self.bus),
            loaded: true,
        })
    }

    async fn load_shared(
        &self,
        name: &str,
        stats: ExtensionStats,
        options: LoadOptions,
    ) -> Result<Extension, LoadError> {
        let response = self
            .bus
            .request("extension.load", options.bus_params(name))
            .await;
        if let Some(err) = response.err {
            return Err(LoadError::new(name, LoadStage::Instantiation, describe(&err)));
        }

        let info = response
            .data
            .and_then(|data| serde_json::from_value::<ExtensionInfo>(data).ok())
            .unwrap_or_default();

        log::info!("loaded extension '{name}' (shared)");
        Ok(Extension {
            name: name.to_string(),
            kind: ExtensionKind::Shared,
            info,
            stats,
            options,
            adapter: None,
            bus: Rc::clone(&self.bus),
            loaded: true,
        })
    }

    fn native_adapter(&self, module: NativeModule, options: &LoadOptions) -> Adapter {
        let memory = native_memory(options.memory_pages);
        let adapter = Adapter::new(
            memory,
            Rc::clone(&self.bus),
            Rc::clone(&self.console),
            options.adapter_options(),
        );
        adapter.attach(Rc::new(module));
        adapter
    }

    fn native_factory(&self, name: &str) -> Option<NativeFactory> {
        self.natives.borrow().get(name).cloned()
    }

    #[cfg(not(target_arch = "wasm32"))]
    async fn instantiate(
        &self,
        name: &str,
        _bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<Adapter, LoadError> {
        let factory = self.native_factory(name).ok_or_else(|| {
            LoadError::new(
                name,
                LoadStage::Instantiation,
                "no WebAssembly engine on this host and no native module registered",
            )
        })?;
        Ok(self.native_adapter(factory(), options))
    }

    #[cfg(target_arch = "wasm32")]
    async fn instantiate(
        &self,
        name: &str,
        bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<Adapter, LoadError> {
        use super::imports;
        use super::instance::web::WebAssemblyInstance;

        if let Some(factory) = self.native_factory(name) {
            return Ok(self.native_adapter(factory(), options));
        }

        let fail = |reason: String| LoadError::new(name, LoadStage::Instantiation, reason);

        let descriptor = js_sys::Object::new();
        js_sys::Reflect::set(
            &descriptor,
            &"initial".into(),
            &options.memory_pages.into(),
        )
        .map_err(|_| fail("failed to describe memory".to_string()))?;
        let memory = js_sys::WebAssembly::Memory::new(&descriptor)
            .map_err(|_| fail(format!("failed to allocate {} pages", options.memory_pages)))?;

        let adapter = Adapter::new(
            LinearMemory::new(memory),
            Rc::clone(&self.bus),
            Rc::clone(&self.console),
            options.adapter_options(),
        );
        let imports = imports::build(&adapter).map_err(fail)?;
        let instance = WebAssemblyInstance::instantiate(bytes, &imports)
            .await
            .map_err(fail)?;
        adapter.attach(Rc::new(instance));
        Ok(adapter)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn native_memory(pages: u32) -> LinearMemory {
    LinearMemory::new(pages)
}

/// A native module on a browser host still gets a real memory object
#[cfg(target_arch = "wasm32")]
fn native_memory(pages: u32) -> LinearMemory {
    let descriptor = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&descriptor, &"initial".into(), &pages.into());
    match js_sys::WebAssembly::Memory::new(&descriptor) {
        Ok(memory) => LinearMemory::new(memory),
        Err(_) => wasm_bindgen::throw_str("failed to allocate extension memory"),
    }
}

/// Run the initializer and read the module metadata, tearing the adapter
/// down on any failure
fn initialize(name: &str, adapter: &Adapter) -> Result<ExtensionInfo, LoadError> {
    let fail = |reason: String| LoadError::new(name, LoadStage::Initializer, reason);

    match adapter.init() {
        Ok(true) => {}
        Ok(false) => {
            adapter.destroy();
            return Err(fail("initializer returned false".to_string()));
        }
        Err(fault) => {
            adapter.terminate(&fault);
            return Err(fail(fault.to_string()));
        }
    }

    adapter.info().map_err(|fault| {
        adapter.terminate(&fault);
        fail(fault.to_string())
    })
}

fn describe(err: &Value) -> String {
    err.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Export section with the given `(name, kind)` entries
    fn module_with_exports(entries: &[(&str, u8)]) -> Vec<u8> {
        let mut section = vec![entries.len() as u8];
        for (name, kind) in entries {
            section.push(name.len() as u8);
            section.extend_from_slice(name.as_bytes());
            section.push(*kind);
            section.push(0);
        }

        let mut bytes = WASM_MAGIC.to_vec();
        bytes.extend_from_slice(&WASM_VERSION);
        bytes.push(EXPORT_SECTION);
        // two-byte LEB128 so sections over 127 bytes still encode
        let len = section.len() as u32;
        bytes.push((len & 0x7f) as u8 | 0x80);
        bytes.push((len >> 7) as u8);
        bytes.extend(section);
        bytes
    }

    fn complete_exports() -> Vec<(&'static str, u8)> {
        let mut entries: Vec<(&str, u8)> = exports::FUNCTIONS
            .iter()
            .map(|name| (*name, export_kind::FUNCTION))
            .collect();
        entries.extend(globals::ALL.iter().map(|name| (*name, export_kind::GLOBAL)));
        entries.push((exports::TABLE, export_kind::TABLE));
        entries
    }

    #[test]
    fn test_validate_complete_module() {
        let bytes = module_with_exports(&complete_exports());
        let found = ModuleValidator::validate(&bytes).unwrap();
        assert_eq!(found.len(), 12);
        assert_eq!(found[0].name, exports::INITIALIZER);
    }

    #[test]
    fn test_validate_header() {
        assert_eq!(ModuleValidator::validate(&[0, 0x61]), Err(ModuleError::TooSmall));
        assert_eq!(
            ModuleValidator::validate(&[1, 2, 3, 4, 1, 0, 0, 0]),
            Err(ModuleError::BadMagic)
        );
        assert_eq!(
            ModuleValidator::validate(&[0, 0x61, 0x73, 0x6d, 2, 0, 0, 0]),
            Err(ModuleError::BadVersion)
        );
    }

    #[test]
    fn test_validate_missing_and_mistyped_exports() {
        let mut entries = complete_exports();
        entries.retain(|(name, _)| *name != exports::VERSION);
        assert_eq!(
            ModuleValidator::validate(&module_with_exports(&entries)),
            Err(ModuleError::MissingExport {
                name: exports::VERSION,
                kind: "function"
            })
        );

        let mut entries = complete_exports();
        for entry in entries.iter_mut() {
            if entry.0 == globals::HEAP_BASE {
                entry.1 = export_kind::FUNCTION;
            }
        }
        assert!(matches!(
            ModuleValidator::validate(&module_with_exports(&entries)),
            Err(ModuleError::MissingExport { name, .. }) if name == globals::HEAP_BASE
        ));
    }

    #[test]
    fn test_validate_truncated_section() {
        let mut bytes = module_with_exports(&complete_exports());
        bytes.truncate(bytes.len() - 3);
        assert_eq!(
            ModuleValidator::validate(&bytes),
            Err(ModuleError::Truncated("section"))
        );
    }

    #[test]
    fn test_validate_oversized_lengths() {
        let header = || {
            let mut bytes = WASM_MAGIC.to_vec();
            bytes.extend_from_slice(&WASM_VERSION);
            bytes
        };
        let max_leb = [0xff, 0xff, 0xff, 0xff, 0x0f];

        let mut section = header();
        section.push(EXPORT_SECTION);
        section.extend_from_slice(&max_leb);
        section.push(0);
        assert_eq!(
            ModuleValidator::exports(&section),
            Err(ModuleError::Truncated("section"))
        );

        let mut entries = vec![1];
        entries.extend_from_slice(&max_leb);
        entries.extend_from_slice(b"name");
        let mut name = header();
        name.push(EXPORT_SECTION);
        name.push(entries.len() as u8);
        name.extend(entries);
        assert_eq!(
            ModuleValidator::exports(&name),
            Err(ModuleError::Truncated("export name"))
        );
    }

    #[test]
    fn test_read_leb128() {
        assert_eq!(read_leb128(&[0x02]), Ok((2, 1)));
        assert_eq!(read_leb128(&[0xE5, 0x8E, 0x26]), Ok((624_485, 3)));
        assert_eq!(read_leb128(&[0x80; 6]), Err(ModuleError::InvalidLeb128));
    }

    #[test]
    fn test_load_options_allow_forms() {
        let joined = LoadOptions::from_json(r#"{"allow": "fs, net_connect,"}"#).unwrap();
        assert_eq!(joined.allow, vec!["fs", "net_connect"]);
        assert_eq!(joined.memory_pages, DEFAULT_MEMORY_PAGES);

        let list = LoadOptions::from_json(r#"{"allow": ["ipc"], "memoryPages": 4}"#).unwrap();
        assert_eq!(list.allow, vec!["ipc"]);
        assert_eq!(list.memory_pages, 4);

        assert!(matches!(
            LoadOptions::from_json(r#"{"allow": 3}"#),
            Err(ExtensionError::Options(_))
        ));
    }

    #[test]
    fn test_adapter_options_policies() {
        let options = LoadOptions::allowing(["fs"]);
        let policies = options.adapter_options().policies;
        assert!(policies.is_allowed("fs_read_file"));
        assert!(!policies.is_allowed("net_connect"));
    }

    #[test]
    fn test_extension_kind_names() {
        assert_eq!(ExtensionKind::from_name("wasm32"), Some(ExtensionKind::Wasm));
        assert_eq!(ExtensionKind::from_name("elf"), None);
        assert_eq!(ExtensionKind::Shared.name(), "shared");
    }
}

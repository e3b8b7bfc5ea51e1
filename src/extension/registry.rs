//! Extension registry
//!
//! The table of open extensions, owned by whoever composes the application.
//! Names are unique: opening a name twice fails, as does closing one that is
//! not open.

use super::binding::Binding;
use super::error::{ExtensionError, ExtensionResult};
use super::instance::NativeModule;
use super::loader::{Extension, LoadOptions, Loader};
use std::collections::BTreeMap;

pub struct ExtensionRegistry {
    loader: Loader,
    extensions: BTreeMap<String, Extension>,
}

impl ExtensionRegistry {
    pub fn new(loader: Loader) -> Self {
        Self {
            loader,
            extensions: BTreeMap::new(),
        }
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Load `name` over the host bus and register it
    pub async fn open(&mut self, name: &str, options: LoadOptions) -> ExtensionResult<&Extension> {
        if self.extensions.contains_key(name) {
            return Err(ExtensionError::AlreadyOpen(name.to_string()));
        }
        let extension = self.loader.load(name, options).await?;
        Ok(self.insert(extension))
    }

    /// Register a native module under `name`
    pub fn open_native(
        &mut self,
        name: &str,
        module: NativeModule,
        options: LoadOptions,
    ) -> ExtensionResult<&Extension> {
        if self.extensions.contains_key(name) {
            return Err(ExtensionError::AlreadyOpen(name.to_string()));
        }
        let extension = self.loader.load_native(name, module, options)?;
        Ok(self.insert(extension))
    }

    fn insert(&mut self, extension: Extension) -> &Extension {
        let name = extension.name().to_string();
        self.extensions.entry(name).or_insert(extension)
    }

    /// Unload and forget `name`
    ///
    /// The entry is removed even when the host reports an unload failure.
    pub async fn close(&mut self, name: &str) -> ExtensionResult<()> {
        let mut extension = self
            .extensions
            .remove(name)
            .ok_or_else(|| ExtensionError::NotOpen(name.to_string()))?;
        if extension.is_loaded() {
            extension.unload().await?;
        }
        Ok(())
    }

    /// Close everything, reporting the first failure
    pub async fn close_all(&mut self) -> ExtensionResult<()> {
        let mut first = Ok(());
        for name in self.names() {
            let result = self.close(&name).await;
            if first.is_ok() {
                first = result;
            }
        }
        first
    }

    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.extensions.get(name)
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.extensions.contains_key(name)
    }

    pub fn binding(&self, name: &str) -> ExtensionResult<Binding> {
        self.get(name)
            .ok_or_else(|| ExtensionError::NotOpen(name.to_string()))?
            .binding()
    }

    pub fn names(&self) -> Vec<String> {
        self.extensions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

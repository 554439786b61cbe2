//! Module registry

use std::sync::Arc;

use super::module::{ModuleDescriptor, ModuleKind, ScanModule};
use super::modules::{MetaTagModule, ServerBannerModule};
use crate::app::config::ModulesConfig;
use crate::error::RegistryError;

struct RegisteredModule {
    module: Arc<dyn ScanModule>,
    enabled: bool,
}

/// Ordered collection of registered scan modules
#[derive(Default)]
pub struct ModuleRegistry {
    entries: Vec<RegisteredModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in modules, configured from `config`
    pub fn with_defaults(config: &ModulesConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        registry.register(Arc::new(MetaTagModule::with_keywords(&config.meta_tags.keywords)))?;
        registry.register(Arc::new(ServerBannerModule::new()))?;

        for name in &config.disabled {
            registry.disable_module(name)?;
        }

        Ok(registry)
    }

    /// Register a module; names must be unique
    pub fn register(&mut self, module: Arc<dyn ScanModule>) -> Result<(), RegistryError> {
        let name = module.descriptor().name.clone();
        if self.contains(&name) {
            return Err(RegistryError::DuplicateModule(name));
        }

        tracing::debug!(module = %name, kind = %module.descriptor().kind, "Registered module");
        self.entries.push(RegisteredModule {
            module,
            enabled: true,
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.module.descriptor().name == name)
    }

    /// Enable a module by name
    pub fn enable_module(&mut self, name: &str) -> Result<(), RegistryError> {
        self.set_enabled(name, true)
    }

    /// Disable a module by name
    pub fn disable_module(&mut self, name: &str) -> Result<(), RegistryError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.module.descriptor().name == name)
            .ok_or_else(|| RegistryError::UnknownModule(name.to_string()))?;

        entry.enabled = enabled;
        tracing::info!(module = name, enabled, "Module state changed");
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.enabled && e.module.descriptor().name == name)
    }

    /// Enabled modules of one kind, in registration order
    pub fn modules_of_kind(&self, kind: ModuleKind) -> Vec<Arc<dyn ScanModule>> {
        self.entries
            .iter()
            .filter(|e| e.enabled && e.module.descriptor().kind == kind)
            .map(|e| Arc::clone(&e.module))
            .collect()
    }

    /// Get list of module names
    pub fn module_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.module.descriptor().name.as_str())
            .collect()
    }

    /// Descriptors of every registered module with its enabled flag
    pub fn descriptors(&self) -> Vec<(ModuleDescriptor, bool)> {
        self.entries
            .iter()
            .map(|e| (e.module.descriptor().clone(), e.enabled))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

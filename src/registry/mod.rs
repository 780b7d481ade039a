// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Module registry
//!
//! Maps module identifiers to factories. A registry is populated during
//! start-up, then sealed; after sealing it is only read, so it can be
//! shared across concurrent builds without locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::capabilities::{Module, Settings};
use crate::errors::{CapflowError, CapflowResult};

/// Constructs a module instance from its settings object
pub type ModuleFactory = Arc<dyn Fn(&Settings) -> anyhow::Result<Arc<dyn Module>> + Send + Sync>;

/// Catalogue of module factories keyed by identifier
///
/// Registering an identifier twice replaces the earlier factory.
#[derive(Default)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
    sealed: bool,
    strict: bool,
}

impl ModuleRegistry {
    /// Create an empty, lenient registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that rejects registration after [`seal`](Self::seal)
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Register (or replace) the factory for `id`
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> CapflowResult<()>
    where
        F: Fn(&Settings) -> anyhow::Result<Arc<dyn Module>> + Send + Sync + 'static,
    {
        let id = id.into();

        if self.sealed {
            if self.strict {
                return Err(CapflowError::RegistrySealed { id });
            }
            tracing::warn!(module = %id, "registering module on a sealed registry");
        }

        if self.factories.insert(id.clone(), Arc::new(factory)).is_some() {
            tracing::debug!(module = %id, "replaced existing module factory");
        }

        Ok(())
    }

    /// Look up the factory for `id`
    pub fn resolve(&self, id: &str) -> CapflowResult<ModuleFactory> {
        self.factories
            .get(id)
            .cloned()
            .ok_or_else(|| CapflowError::unknown_module(id, self.factories.keys().map(String::as_str)))
    }

    /// Freeze the registry
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.identifiers())
            .field("sealed", &self.sealed)
            .field("strict", &self.strict)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ConstantModule;
    use serde_json::json;

    fn constant_factory(s: &Settings) -> anyhow::Result<Arc<dyn Module>> {
        Ok(Arc::new(ConstantModule::from_settings(s)?) as Arc<dyn Module>)
    }

    #[test]
    fn test_resolve_unknown_module() {
        let mut registry = ModuleRegistry::new();
        registry.register("pdf_parser", constant_factory).unwrap();

        let err = registry.resolve("pdf_parserr").err().unwrap();
        assert!(matches!(
            err,
            CapflowError::UnknownModule { ref id, .. } if id == "pdf_parserr"
        ));
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = ModuleRegistry::new();
        registry.register("source", constant_factory).unwrap();
        registry
            .register("source", |_: &Settings| {
                Err(anyhow::anyhow!("replacement factory"))
            })
            .unwrap();

        assert_eq!(registry.len(), 1);
        let factory = registry.resolve("source").unwrap();
        let err = factory(&json!({ "value": 1 })).err().unwrap();
        assert_eq!(err.to_string(), "replacement factory");
    }

    #[test]
    fn test_strict_registry_rejects_late_registration() {
        let mut registry = ModuleRegistry::strict();
        registry.register("source", constant_factory).unwrap();
        registry.seal();

        let result = registry.register("late", constant_factory);
        assert!(matches!(result, Err(CapflowError::RegistrySealed { .. })));
        assert!(!registry.contains("late"));
    }

    #[test]
    fn test_lenient_registry_accepts_late_registration() {
        let mut registry = ModuleRegistry::new();
        registry.seal();

        registry.register("late", constant_factory).unwrap();
        assert!(registry.contains("late"));
        assert!(registry.is_sealed());
    }

    #[test]
    fn test_identifiers_are_sorted() {
        let mut registry = ModuleRegistry::new();
        for id in ["web_scraper", "analyzer", "pdf_parser"] {
            registry.register(id, constant_factory).unwrap();
        }

        assert_eq!(registry.identifiers(), vec!["analyzer", "pdf_parser", "web_scraper"]);
    }
}

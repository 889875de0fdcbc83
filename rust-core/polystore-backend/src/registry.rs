// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Backend factory registry.
//
// The provider instantiates databases through this table. Built-in backends
// are enumerated in one place here, feature-conditional ones included;
// hosts may register additional factories before constructing a provider.

use std::collections::HashMap;
use std::sync::Arc;

use polystore_core::{KvError, KvResult};
use serde_json::Value;

use crate::backend::DatabaseBackend;

/// Builds a backend from its JSON configuration.
pub type BackendFactory = fn(&Value) -> KvResult<Arc<dyn DatabaseBackend>>;

/// Table of backend type name to factory.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// An empty registry. Mostly useful in tests.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry holding every built-in backend enabled at build time.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("map", crate::mem::map::MapBackend::open);
        registry.register("set", crate::mem::set::SetBackend::open);
        registry.register(
            "unordered_map",
            crate::mem::unordered_map::UnorderedMapBackend::open,
        );
        registry.register(
            "unordered_set",
            crate::mem::unordered_set::UnorderedSetBackend::open,
        );
        #[cfg(feature = "redb-backend")]
        registry.register("redb", crate::disk::redb::RedbBackend::open);
        #[cfg(feature = "sled-backend")]
        registry.register("sled", crate::disk::sled::SledBackend::open);
        registry
    }

    /// Register (or replace) a factory under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Instantiate a backend of type `name` from `config`.
    pub fn create(&self, name: &str, config: &Value) -> KvResult<Arc<dyn DatabaseBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| KvError::InvalidBackend(name.to_string()))?;
        factory(config)
    }

    /// True if a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// The registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_include_memory_backends() {
        let registry = BackendRegistry::with_defaults();
        for name in ["map", "set", "unordered_map", "unordered_set"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let registry = BackendRegistry::with_defaults();
        let err = match registry.create("leveldb", &serde_json::json!({})) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, KvError::InvalidBackend(name) if name == "leveldb"));
    }

    #[test]
    fn test_create_builds_named_backend() {
        let registry = BackendRegistry::with_defaults();
        let backend = registry.create("map", &serde_json::json!({})).unwrap();
        assert_eq!(backend.name(), "map");
    }

    #[test]
    fn test_host_registered_factory() {
        let mut registry = BackendRegistry::empty();
        assert!(!registry.contains("map"));
        registry.register("map", crate::mem::map::MapBackend::open);
        assert!(registry.contains("map"));
        assert_eq!(registry.names(), vec!["map"]);
    }
}

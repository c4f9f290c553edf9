//! Resource name to key store mapping.

use std::{collections::HashMap, sync::Arc};

use keyrot_storage::{KeyStore, KvBackend};

use crate::{
    config::ConsoleConfig,
    error::{AdminError, AdminResult},
};

/// Key stores addressable by resource name.
#[derive(Clone, Debug, Default)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<KeyStore>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the configured resource over `backend`.
    #[must_use]
    pub fn from_config(config: &ConsoleConfig, backend: Arc<dyn KvBackend>) -> Self {
        let store = KeyStore::builder()
            .backend(backend)
            .table(config.table_name())
            .page_size(config.scan_page_size())
            .build();
        Self::new().with_store(config.resource_name(), store)
    }

    /// Registers `store` under `name`, replacing any previous registration.
    #[must_use]
    pub fn with_store(mut self, name: impl Into<String>, store: KeyStore) -> Self {
        self.stores.insert(name.into(), Arc::new(store));
        self
    }

    /// Resolves a resource name.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::UnknownResource`] if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> AdminResult<&Arc<KeyStore>> {
        self.stores.get(name).ok_or_else(|| AdminError::unknown_resource(name))
    }

    /// Registered resource names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

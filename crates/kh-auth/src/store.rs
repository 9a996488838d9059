use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::StoreError;

/// Identifier-keyed string store with confidentiality at rest
///
/// The handler only ever writes one opaque string per token identifier.
#[async_trait::async_trait]
pub trait SecureStore: Send + Sync {
    /// Read the value stored under `identifier`, if any
    async fn get_string(&self, identifier: &str) -> Option<String>;

    /// Create or overwrite the value stored under `identifier`
    async fn save(&self, value: &str, identifier: &str) -> Result<(), StoreError>;

    /// Remove the value stored under `identifier`; absent entries are not an error
    async fn remove(&self, identifier: &str) -> Result<(), StoreError>;
}

/// In-memory secure store for tests and throwaway sessions
#[derive(Debug, Clone, Default)]
pub struct MemorySecureStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one entry
    pub fn with_entry(identifier: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.write() {
            entries.insert(identifier.to_string(), value.to_string());
        }
        store
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(identifier))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl SecureStore for MemorySecureStore {
    async fn get_string(&self, identifier: &str) -> Option<String> {
        self.entries.read().ok()?.get(identifier).cloned()
    }

    async fn save(&self, value: &str, identifier: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Unavailable("Lock poisoned".to_string()))?
            .insert(identifier.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, identifier: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|_| StoreError::Unavailable("Lock poisoned".to_string()))?
            .remove(identifier);
        Ok(())
    }
}

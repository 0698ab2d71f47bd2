//! Durable key-value storage for persisted contexts
//!
//! Payloads are opaque bytes keyed by Ref identity; [`snapshot`] defines what
//! the manager writes into them.

pub mod persistence;
pub mod snapshot;

pub use persistence::SledStore;
pub use snapshot::{ContextSnapshot, SNAPSHOT_VERSION};

use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Durable store interface
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Make previous writes durable. No-op for in-memory stores.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-process store for tests and ephemeral managers
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

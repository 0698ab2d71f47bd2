//! Sled-backed durable store

use crate::error::StoreError;
use crate::store::DurableStore;
use std::path::Path;

const TREE_NAME: &str = "contenthash";

/// Sled-based implementation of [`DurableStore`]
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    /// Open (or create) a sled database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Io(format!("Failed to open sled database: {}", e)))?;
        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|e| StoreError::Io(format!("Failed to open tree {}: {}", TREE_NAME, e)))?;
        Ok(Self { db, tree })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }
}

impl DurableStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self
            .tree
            .get(key.as_bytes())
            .map_err(|e| StoreError::Io(format!("Failed to get {}: {}", key, e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.tree
            .insert(key.as_bytes(), value)
            .map_err(|e| StoreError::Io(format!("Failed to put {}: {}", key, e)))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.tree
            .remove(key.as_bytes())
            .map_err(|e| StoreError::Io(format!("Failed to delete {}: {}", key, e)))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.tree
            .flush()
            .map_err(|e| StoreError::Io(format!("Failed to flush database: {}", e)))?;
        Ok(())
    }
}

//! Versioned bincode encoding of a context's loaded tree.

use crate::error::StoreError;
use crate::tree::node::CacheRecord;
use serde::{Deserialize, Serialize};

/// Bumped whenever the record layout or digest encoding changes.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub version: u32,
    /// Records in key order
    pub records: Vec<(String, CacheRecord)>,
    /// Roots of fully loaded subtrees
    pub scanned: Vec<String>,
}

impl ContextSnapshot {
    pub fn new(records: Vec<(String, CacheRecord)>, scanned: Vec<String>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            records,
            scanned,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(self).map_err(|e| StoreError::Encode(e.to_string()))
    }

    /// Decode a payload, rejecting other versions.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        // The version is the leading field, so it can be checked before the
        // rest of a foreign layout is interpreted.
        let version: u32 =
            bincode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))?;
        if version != SNAPSHOT_VERSION {
            return Err(StoreError::Version {
                found: version,
                expected: SNAPSHOT_VERSION,
            });
        }
        bincode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

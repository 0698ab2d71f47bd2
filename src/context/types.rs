//! Change records fed to a context in stream mode.

use crate::tree::node::FileStat;
use crate::types::Digest;
use serde::{Deserialize, Serialize};

/// Kind of change produced by a differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

/// Entry state carried by an Add or Modify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub stat: FileStat,
    /// Leaf digest computed by the differ. Required for regular files that
    /// are not hardlinks; recomputed from `stat` for everything else.
    pub digest: Option<Digest>,
}

impl ChangeInfo {
    pub fn new(stat: FileStat, digest: Option<Digest>) -> Self {
        Self { stat, digest }
    }

    /// Info for a regular file whose bytes are `content`.
    pub fn file(stat: FileStat, content: &[u8]) -> Self {
        let digest = crate::tree::hasher::hash_stat_with_content(&stat, content);
        Self {
            stat,
            digest: Some(digest),
        }
    }

    pub fn stat_only(stat: FileStat) -> Self {
        Self { stat, digest: None }
    }
}

/// One record of a change stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: String,
    /// Absent for deletes.
    pub info: Option<ChangeInfo>,
}

impl Change {
    pub fn add(path: impl Into<String>, info: ChangeInfo) -> Self {
        Self {
            kind: ChangeKind::Add,
            path: path.into(),
            info: Some(info),
        }
    }

    pub fn modify(path: impl Into<String>, info: ChangeInfo) -> Self {
        Self {
            kind: ChangeKind::Modify,
            path: path.into(),
            info: Some(info),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            path: path.into(),
            info: None,
        }
    }
}

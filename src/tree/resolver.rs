//! Symlink-aware path resolution against a content root
//!
//! Resolution walks one component at a time. A symlink component is replaced
//! by its target (absolute targets restart at the content root, `..` clamps
//! at the root) when it is an intermediate component or when the final
//! component should be followed.

use crate::error::ChecksumError;
use crate::tree::node::CacheRecord;
use crate::tree::path;
use std::collections::VecDeque;

/// What the tree knows about one path.
#[derive(Debug, Clone)]
pub enum Lookup {
    Present(CacheRecord),
    /// Known not to exist (the path lies in a fully scanned region).
    Absent,
    /// Not loaded yet.
    Unknown,
}

/// Read access to a partially loaded tree.
pub trait TreeView {
    fn lookup(&self, path: &str) -> Lookup;
}

/// Outcome of one resolution attempt
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved { path: String, record: CacheRecord },
    /// `path` must be loaded before resolution can continue.
    Pending(String),
}

/// Resolve `query` to a canonical path and its record.
pub fn resolve(
    view: &dyn TreeView,
    query: &str,
    follow_final: bool,
    max_hops: usize,
) -> Result<Resolution, ChecksumError> {
    let cleaned = path::clean(query);
    let mut pending: VecDeque<String> = path::components(&cleaned).map(String::from).collect();
    let mut current = "/".to_string();
    let mut hops = 0usize;

    while let Some(component) = pending.pop_front() {
        let candidate = path::join(&current, &component);
        let record = match view.lookup(&candidate) {
            Lookup::Present(record) => record,
            Lookup::Absent => return Err(ChecksumError::NotFound(cleaned)),
            Lookup::Unknown => return Ok(Resolution::Pending(candidate)),
        };
        let is_last = pending.is_empty();

        if record.is_symlink() && (!is_last || follow_final) {
            hops += 1;
            if hops > max_hops {
                return Err(ChecksumError::CyclicSymlink(cleaned));
            }
            let target = if record.linkname.starts_with('/') {
                path::clean(&record.linkname)
            } else {
                path::clean(&format!("{}/{}", current, record.linkname))
            };
            let mut next: VecDeque<String> =
                path::components(&target).map(String::from).collect();
            next.extend(pending);
            pending = next;
            current = "/".to_string();
            continue;
        }

        // A path through a non-directory does not exist.
        if !is_last && !record.is_dir() {
            return Err(ChecksumError::NotFound(cleaned));
        }
        current = candidate;
    }

    match view.lookup(&current) {
        Lookup::Present(record) => Ok(Resolution::Resolved {
            path: current,
            record,
        }),
        Lookup::Absent => Err(ChecksumError::NotFound(cleaned)),
        Lookup::Unknown => Ok(Resolution::Pending(current)),
    }
}

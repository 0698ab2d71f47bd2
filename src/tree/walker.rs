//! Subtree scanner turning a mounted filesystem into cache records

use crate::error::ChecksumError;
use crate::mount::Filesystem;
use crate::tree::hasher::hash_entry;
use crate::tree::node::{CacheRecord, FileStat, RecordKind};
use crate::types::Digest;
use std::collections::HashMap;
use tracing::{debug, trace};

/// One scanned entry
#[derive(Debug, Clone)]
pub struct ScannedEntry {
    pub path: String,
    pub record: CacheRecord,
}

/// Scanner over one mounted filesystem
///
/// Regular files with more than one link are keyed by (device, inode) for the
/// lifetime of the scanner, so each inode's bytes are read once.
pub struct Walker<'a> {
    fs: &'a dyn Filesystem,
    inodes: HashMap<(u64, u64), Digest>,
}

impl<'a> Walker<'a> {
    pub fn new(fs: &'a dyn Filesystem) -> Self {
        Self {
            fs,
            inodes: HashMap::new(),
        }
    }

    /// Scan `root` and everything below it, in key order.
    ///
    /// Symlinks are recorded as symlinks and never followed.
    pub fn scan(&mut self, root: &str) -> Result<Vec<ScannedEntry>, ChecksumError> {
        let mut entries = Vec::new();
        let mut failed_at = root.to_string();
        let fs = self.fs;
        let inodes = &mut self.inodes;

        let result = fs.walk(root, &mut |path, stat| {
            failed_at = path.to_string();
            let record = build_record(fs, inodes, path, stat)?;
            trace!(path = %path, kind = ?record.kind, "Scanned entry");
            entries.push(ScannedEntry {
                path: path.to_string(),
                record,
            });
            Ok(())
        });
        result.map_err(|e| ChecksumError::io(&failed_at, e))?;

        // Walk order is pre-order by name; key order puts "a/b" before "a-b".
        entries.sort_by(|a, b| {
            crate::tree::path::to_key(&a.path).cmp(&crate::tree::path::to_key(&b.path))
        });
        debug!(root = %root, entries = entries.len(), "Scan complete");
        Ok(entries)
    }

    /// Record for a single entry without descending into it.
    pub fn stat_one(&mut self, path: &str) -> Result<CacheRecord, ChecksumError> {
        let stat = self.fs.lstat(path).map_err(|e| ChecksumError::io(path, e))?;
        build_record(self.fs, &mut self.inodes, path, &stat)
            .map_err(|e| ChecksumError::io(path, e))
    }
}

fn build_record(
    fs: &dyn Filesystem,
    inodes: &mut HashMap<(u64, u64), Digest>,
    path: &str,
    stat: &FileStat,
) -> std::io::Result<CacheRecord> {
    let kind = RecordKind::from(stat.kind());
    let linkname = if stat.is_symlink() {
        stat.linkname.clone()
    } else {
        String::new()
    };

    let shared_inode = match stat.inode {
        Some(id) if stat.is_regular() && stat.nlink > 1 => Some(id),
        _ => None,
    };
    if let Some(id) = shared_inode {
        if let Some(digest) = inodes.get(&id) {
            return Ok(CacheRecord::new(kind, linkname, digest.clone()));
        }
    }

    let digest = hash_entry(fs, path, stat)?;
    if let Some(id) = shared_inode {
        inodes.insert(id, digest.clone());
    }
    Ok(CacheRecord::new(kind, linkname, digest))
}

//! Stream mode: applying differ change records.

use super::{CacheContext, Change, ChangeInfo, ChangeKind, ContextState};
use crate::error::ChecksumError;
use crate::tree::hasher::StatHasher;
use crate::tree::node::{CacheRecord, FileStat, RecordKind};
use crate::tree::path;
use tracing::{debug, trace, warn};

impl CacheContext {
    /// Apply one change record.
    ///
    /// A malformed record halts the context: it refuses every later change
    /// and checksum.
    pub fn handle_change(
        &self,
        kind: ChangeKind,
        change_path: &str,
        info: Option<&ChangeInfo>,
    ) -> Result<(), ChecksumError> {
        let p = path::clean(change_path);
        let mut state = self.state.write();
        if let Some(reason) = &state.halted {
            return Err(ChecksumError::StreamHalted(reason.clone()));
        }

        if !state.streaming {
            state.streaming = true;
            state.scanned.clear();
            state.scanned.insert("/".to_string());
            if !state.index.contains("/") {
                let root = root_record();
                state.index.insert("/", root);
            }
            debug!(ref_id = %self.id, "Context switched to stream mode");
        }

        let result = match kind {
            ChangeKind::Delete => {
                apply_delete(&mut state, &p);
                Ok(())
            }
            ChangeKind::Add | ChangeKind::Modify => match info {
                Some(info) => apply_upsert(&mut state, &p, info),
                None => Err(ChecksumError::malformed(&p, "missing file info")),
            },
        };

        match result {
            Ok(()) => {
                trace!(path = %p, kind = ?kind, "Applied change");
                self.mark_modified();
                Ok(())
            }
            Err(err) => {
                warn!(ref_id = %self.id, path = %p, error = %err, "Halting change stream");
                state.halted = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Convenience wrapper over [`CacheContext::handle_change`].
    pub fn apply(&self, change: &Change) -> Result<(), ChecksumError> {
        self.handle_change(change.kind, &change.path, change.info.as_ref())
    }

    /// Apply records in order, stopping at the first failed or malformed one.
    pub fn apply_stream<I>(&self, changes: I) -> Result<usize, ChecksumError>
    where
        I: IntoIterator<Item = Result<Change, ChecksumError>>,
    {
        let mut applied = 0;
        for item in changes {
            match item {
                Ok(change) => self.apply(&change)?,
                Err(err) => {
                    warn!(ref_id = %self.id, error = %err, "Change stream reported an error");
                    self.state.write().halted = Some(err.to_string());
                    return Err(err);
                }
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Start a new differ session: forget hardlink aliases seen so far.
    pub fn reset_link_map(&self) {
        self.state.write().links.clear();
    }
}

fn root_record() -> CacheRecord {
    let stat = FileStat::directory(0o755);
    CacheRecord::new(
        RecordKind::Directory,
        String::new(),
        StatHasher::from_stat(&stat).finish(),
    )
}

fn apply_delete(state: &mut ContextState, p: &str) {
    let removed = state.index.remove_subtree(p);
    if removed > 0 {
        state.index.invalidate(path::parent(p));
    }
    // Aliases inside the deleted subtree are gone, and so is any source there.
    state.links.retain(|source, aliases| {
        aliases.retain(|alias| !path::is_within(p, alias));
        !aliases.is_empty() && !path::is_within(p, source)
    });
}

fn apply_upsert(state: &mut ContextState, p: &str, info: &ChangeInfo) -> Result<(), ChecksumError> {
    let stat = &info.stat;
    if p == "/" && !stat.is_dir() {
        return Err(ChecksumError::malformed(p, "content root must be a directory"));
    }

    let kind = RecordKind::from(stat.kind());
    let mut record = if stat.is_regular() && !stat.linkname.is_empty() {
        let source = path::clean(&stat.linkname);
        let copied = state.index.get(&source).cloned();
        state.links.entry(source).or_default().push(p.to_string());
        match copied {
            Some(mut source_record) => {
                source_record.contents = None;
                source_record
            }
            None => CacheRecord::new(kind, String::new(), leaf_digest(p, info)?),
        }
    } else {
        let linkname = if stat.is_symlink() {
            stat.linkname.clone()
        } else {
            String::new()
        };
        CacheRecord::new(kind, linkname, leaf_digest(p, info)?)
    };
    record.contents = None;

    let was_dir = state.index.get(p).map_or(false, |prev| prev.is_dir());
    if was_dir && !record.is_dir() {
        state.index.remove_subtree(p);
    }
    state.index.insert(p, record.clone());
    state.index.invalidate(p);

    if !record.is_dir() {
        if let Some(aliases) = state.links.remove(p) {
            for alias in aliases {
                state.index.insert(&alias, record.clone());
                state.index.invalidate(&alias);
            }
        }
    }
    Ok(())
}

/// Digest for an Add/Modify: supplied by the differ for regular files,
/// computed from the stat for everything else.
fn leaf_digest(p: &str, info: &ChangeInfo) -> Result<crate::types::Digest, ChecksumError> {
    if info.stat.is_regular() {
        if !info.stat.linkname.is_empty() {
            return Ok(info
                .digest
                .clone()
                .unwrap_or_else(|| StatHasher::from_stat(&info.stat).finish()));
        }
        return info
            .digest
            .clone()
            .ok_or_else(|| ChecksumError::malformed(p, "regular file without content digest"));
    }
    Ok(StatHasher::from_stat(&info.stat).finish())
}

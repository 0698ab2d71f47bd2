//! Ordered path index for one content root
//!
//! Records are keyed by [`path::to_key`], so a directory's descendants form
//! one contiguous key range. Deleting a directory is a range delete; listing
//! direct children walks that range and skips over nested subtrees.

use crate::tree::hasher::compose;
use crate::tree::node::CacheRecord;
use crate::tree::path;
use crate::types::Digest;
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    records: BTreeMap<Vec<u8>, CacheRecord>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn get(&self, path: &str) -> Option<&CacheRecord> {
        self.records.get(&path::to_key(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(&path::to_key(path))
    }

    /// Insert or replace the record at `path`, returning the previous one.
    pub fn insert(&mut self, path: &str, record: CacheRecord) -> Option<CacheRecord> {
        self.records.insert(path::to_key(path), record)
    }

    /// Remove `path` and everything below it. Returns the number of records
    /// removed; zero when nothing was there.
    pub fn remove_subtree(&mut self, path: &str) -> usize {
        let mut removed = 0;
        if path != "/" && self.records.remove(&path::to_key(path)).is_some() {
            removed += 1;
        }
        let prefix = path::child_prefix(path);
        let doomed: Vec<Vec<u8>> = self
            .records
            .range((Bound::Excluded(prefix.clone()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.records.remove(&key);
            removed += 1;
        }
        if path == "/" && self.records.remove(&path::to_key("/")).is_some() {
            removed += 1;
        }
        removed
    }

    /// Direct children of `dir` as (name, record), in key order.
    pub fn children(&self, dir: &str) -> Vec<(String, &CacheRecord)> {
        let prefix = path::child_prefix(dir);
        let mut out = Vec::new();
        // The root's child prefix is also the root's own key.
        let mut lower = Bound::Excluded(prefix.clone());
        loop {
            let next = self
                .records
                .range((lower.clone(), Bound::Unbounded))
                .next();
            let (key, record) = match next {
                Some((k, r)) if k.starts_with(&prefix) => (k, r),
                _ => break,
            };
            let rest = &key[prefix.len()..];
            match rest.iter().position(|&b| b == path::KEY_SEPARATOR) {
                Some(pos) => {
                    // Nested entry without its own direct-child record;
                    // jump past the whole nested subtree.
                    let mut skip = key[..prefix.len() + pos].to_vec();
                    skip.push(path::KEY_SEPARATOR + 1);
                    lower = Bound::Included(skip);
                }
                None => {
                    out.push((String::from_utf8_lossy(rest).into_owned(), record));
                    let mut skip = key.clone();
                    skip.push(path::KEY_SEPARATOR + 1);
                    lower = Bound::Included(skip);
                }
            }
        }
        out
    }

    /// Every record strictly below `dir` as (canonical path, record), in key order.
    pub fn descendants(&self, dir: &str) -> Vec<(String, &CacheRecord)> {
        let prefix = path::child_prefix(dir);
        self.records
            .range((Bound::Excluded(prefix.clone()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, r)| (path::from_key(k), r))
            .collect()
    }

    /// All records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (String, &CacheRecord)> {
        self.records.iter().map(|(k, r)| (path::from_key(k), r))
    }

    /// Mark the composed digest of `path` and every ancestor as stale.
    pub fn invalidate(&mut self, path: &str) {
        if let Some(record) = self.records.get_mut(&path::to_key(path)) {
            record.contents = None;
        }
        for ancestor in path::ancestors(path) {
            if let Some(record) = self.records.get_mut(&path::to_key(ancestor)) {
                record.contents = None;
            }
        }
    }

    /// Composed digest of a directory's contents, recomputing stale levels.
    ///
    /// Each child contributes `(name, digest)`; a child directory additionally
    /// contributes `(name + separator, contents)`. Returns `None` if `dir`
    /// has no directory record.
    pub fn composed_digest(&mut self, dir: &str) -> Option<Digest> {
        let record = self.get(dir)?;
        if !record.is_dir() {
            return None;
        }
        if let Some(cached) = &record.contents {
            return Some(cached.clone());
        }

        let children: Vec<(String, bool, Digest)> = self
            .children(dir)
            .into_iter()
            .map(|(name, r)| (name, r.is_dir(), r.digest.clone()))
            .collect();

        let mut entries: Vec<(Vec<u8>, Digest)> = Vec::with_capacity(children.len() * 2);
        for (name, is_dir, digest) in children {
            let key = path::relative_key(&name);
            if is_dir {
                let child_path = path::join(dir, &name);
                let contents = self
                    .composed_digest(&child_path)
                    .unwrap_or_else(Digest::empty);
                let mut contents_key = key.clone();
                contents_key.push(path::KEY_SEPARATOR);
                entries.push((key, digest));
                entries.push((contents_key, contents));
            } else {
                entries.push((key, digest));
            }
        }

        let digest = compose(entries.iter().map(|(k, d)| (k.as_slice(), d)));
        if let Some(record) = self.records.get_mut(&path::to_key(dir)) {
            record.contents = Some(digest.clone());
        }
        Some(digest)
    }
}

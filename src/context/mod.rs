//! Cache context: the incremental digest tree of one content root.
//!
//! A context is filled either lazily from a mounted filesystem (scan mode) or
//! from change records produced by a differ (stream mode). Checksum queries
//! run against whatever has been loaded, loading more on demand.

mod checksum;
mod scan;
mod stream;
pub mod types;

pub use types::{Change, ChangeInfo, ChangeKind};

use crate::concurrency::FlightGroup;
use crate::mount::{Filesystem, Ref};
use crate::store::snapshot::ContextSnapshot;
use crate::tree::index::PathIndex;
use crate::tree::node::CacheRecord;
use crate::tree::path;
use crate::tree::resolver::{Lookup, TreeView};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Mutable tree state, guarded by one lock per context.
#[derive(Debug, Default)]
pub(crate) struct ContextState {
    pub(crate) index: PathIndex,
    /// Roots of fully loaded subtrees. Anything below one of these that is
    /// missing from the index does not exist.
    pub(crate) scanned: BTreeSet<String>,
    /// Hardlink source path -> aliases recorded in the current differ session.
    pub(crate) links: HashMap<String, Vec<String>>,
    pub(crate) streaming: bool,
    pub(crate) halted: Option<String>,
}

impl ContextState {
    /// Whether `p` lies in a fully loaded subtree.
    pub(crate) fn covered(&self, p: &str) -> bool {
        self.scanned.contains(p) || path::ancestors(p).iter().any(|a| self.scanned.contains(*a))
    }

    /// Replace the subtree at `root` with freshly scanned records.
    pub(crate) fn install_scan(&mut self, root: &str, records: Vec<(String, CacheRecord)>) {
        self.index.remove_subtree(root);
        for (p, record) in records {
            self.index.insert(&p, record);
        }
        self.scanned.retain(|s| !path::is_within(root, s));
        self.scanned.insert(root.to_string());
        self.index.invalidate(root);
    }
}

impl TreeView for ContextState {
    fn lookup(&self, p: &str) -> Lookup {
        match self.index.get(p) {
            Some(record) => Lookup::Present(record.clone()),
            None if self.covered(p) => Lookup::Absent,
            None => Lookup::Unknown,
        }
    }
}

/// Digest tree for one content root
pub struct CacheContext {
    id: String,
    source: Arc<dyn Ref>,
    state: Arc<RwLock<ContextState>>,
    fs: OnceCell<Arc<dyn Filesystem>>,
    flights: FlightGroup<()>,
    max_hops: usize,
    modified: Arc<AtomicBool>,
}

impl CacheContext {
    /// Empty context that scans `source` on demand.
    pub fn new(source: Arc<dyn Ref>, max_hops: usize) -> Self {
        Self {
            id: source.id().to_string(),
            source,
            state: Arc::new(RwLock::new(ContextState::default())),
            fs: OnceCell::new(),
            flights: FlightGroup::new(),
            max_hops,
            modified: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Context rebuilt from a persisted snapshot; nothing is rescanned.
    pub fn from_snapshot(source: Arc<dyn Ref>, snapshot: ContextSnapshot, max_hops: usize) -> Self {
        let ctx = Self::new(source, max_hops);
        {
            let mut state = ctx.state.write();
            for (p, record) in snapshot.records {
                state.index.insert(&p, record);
            }
            state.scanned = snapshot.scanned.into_iter().collect();
        }
        ctx
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &Arc<dyn Ref> {
        &self.source
    }

    /// Serializable copy of the loaded tree.
    pub fn snapshot(&self) -> ContextSnapshot {
        let state = self.state.read();
        ContextSnapshot::new(
            state.index.iter().map(|(p, r)| (p, r.clone())).collect(),
            state.scanned.iter().cloned().collect(),
        )
    }

    /// Whether the tree changed since the last [`CacheContext::take_modified`].
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    /// Clear and return the modified flag.
    pub fn take_modified(&self) -> bool {
        self.modified.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn mark_modified(&self) {
        self.modified.store(true, Ordering::SeqCst);
    }

    /// Reason the change stream halted, if it did.
    pub fn halted(&self) -> Option<String> {
        self.state.read().halted.clone()
    }

    pub fn is_halted(&self) -> bool {
        self.state.read().halted.is_some()
    }

    /// Number of loaded records.
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `p` is inside a fully loaded subtree.
    pub fn is_scanned(&self, p: &str) -> bool {
        self.state.read().covered(&path::clean(p))
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("id", &self.id)
            .field("records", &self.len())
            .field("halted", &self.halted())
            .finish()
    }
}

//! Lazy loading: mounting, subtree scans and single-entry stats.

use super::CacheContext;
use crate::error::ChecksumError;
use crate::mount::{Filesystem, SessionGroup};
use crate::tree::node::CacheRecord;
use crate::tree::path;
use crate::tree::resolver::{resolve, Resolution};
use crate::tree::walker::Walker;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

impl CacheContext {
    /// Mount the source on first use.
    pub(crate) async fn filesystem(
        &self,
        session: &SessionGroup,
    ) -> Result<Arc<dyn Filesystem>, ChecksumError> {
        let fs = self
            .fs
            .get_or_try_init(|| async {
                debug!(ref_id = %self.id, "Mounting content root");
                self.source.mount(true, session).await.map_err(|e| match e {
                    ChecksumError::InvalidMount(msg) => ChecksumError::InvalidMount(msg),
                    other => ChecksumError::InvalidMount(other.to_string()),
                })
            })
            .await?;
        Ok(Arc::clone(fs))
    }

    /// Make sure the whole subtree at canonical path `p` is loaded.
    ///
    /// Concurrent callers for the same path share one scan; a caller that
    /// stops waiting does not cancel it.
    #[instrument(skip(self, session), fields(ref_id = %self.id))]
    pub(crate) async fn ensure_scanned(
        &self,
        p: &str,
        session: &SessionGroup,
    ) -> Result<(), ChecksumError> {
        if self.state.read().covered(p) {
            return Ok(());
        }
        let fs = self.filesystem(session).await?;
        let state = Arc::clone(&self.state);
        let modified = Arc::clone(&self.modified);
        let root = p.to_string();

        self.flights
            .run(p, async move {
                let scan_root = root.clone();
                let entries = tokio::task::spawn_blocking(move || {
                    Walker::new(fs.as_ref()).scan(&scan_root)
                })
                .await
                .map_err(|e| ChecksumError::Internal(format!("scan task failed: {}", e)))??;

                let mut state = state.write();
                if state.covered(&root) {
                    return Ok(());
                }
                let count = entries.len();
                state.install_scan(
                    &root,
                    entries.into_iter().map(|e| (e.path, e.record)).collect(),
                );
                modified.store(true, Ordering::SeqCst);
                debug!(root = %root, entries = count, "Installed scanned subtree");
                Ok(())
            })
            .await
    }

    /// Load the single entry at `p` without descending into it.
    async fn load_entry(&self, p: &str, session: &SessionGroup) -> Result<(), ChecksumError> {
        let fs = self.filesystem(session).await?;
        let target = p.to_string();
        let record = tokio::task::spawn_blocking(move || Walker::new(fs.as_ref()).stat_one(&target))
            .await
            .map_err(|e| ChecksumError::Internal(format!("stat task failed: {}", e)))??;

        let mut state = self.state.write();
        if !state.covered(p) && !state.index.contains(p) {
            state.index.insert(p, record);
        }
        Ok(())
    }

    /// Resolve `query` to a canonical path, loading entries as resolution
    /// reaches them.
    pub(crate) async fn resolve_loaded(
        &self,
        query: &str,
        follow_final: bool,
        session: &SessionGroup,
    ) -> Result<(String, CacheRecord), ChecksumError> {
        loop {
            let step = {
                let state = self.state.read();
                resolve(&*state, query, follow_final, self.max_hops)?
            };
            match step {
                Resolution::Resolved { path, record } => return Ok((path, record)),
                Resolution::Pending(missing) => {
                    if missing == "/" {
                        self.ensure_scanned("/", session).await?;
                    } else {
                        self.load_entry(&missing, session).await.map_err(|e| {
                            if e.is_not_found() {
                                ChecksumError::NotFound(path::clean(query))
                            } else {
                                e
                            }
                        })?;
                    }
                }
            }
        }
    }
}

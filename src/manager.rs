//! Cache manager: an LRU-bounded registry of contexts keyed by Ref identity
//!
//! Contexts are created on first use, restored from the durable store when a
//! persisted snapshot exists, and written back in the background. A store
//! failure never fails a query; the context is simply rebuilt next time.

use crate::concurrency::KeyedLocks;
use crate::config::ManagerConfig;
use crate::context::{CacheContext, Change};
use crate::error::{ChecksumError, StoreError};
use crate::mount::{Ref, SessionGroup};
use crate::store::{ContextSnapshot, DurableStore, MemoryStore, SledStore};
use crate::types::{ChecksumOpts, Digest};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Point-in-time manager counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub resident: usize,
    pub hits: u64,
    pub misses: u64,
    pub store_loads: u64,
    pub evictions: u64,
    pub persists: u64,
    pub persist_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    store_loads: AtomicU64,
    evictions: AtomicU64,
    persists: AtomicU64,
    persist_failures: AtomicU64,
}

/// Background store work for one key. Each task waits for the one queued
/// before it, so writes and deletes of a key land in order.
type StoreTask = Shared<BoxFuture<'static, ()>>;

struct Slot {
    context: Arc<CacheContext>,
    last_used: u64,
}

/// Process-wide cache of [`CacheContext`]s
pub struct CacheManager {
    config: ManagerConfig,
    store: Arc<dyn DurableStore>,
    resident: Mutex<HashMap<String, Slot>>,
    clock: AtomicU64,
    locks: KeyedLocks,
    pending: Mutex<HashMap<String, StoreTask>>,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

impl CacheManager {
    pub fn new(config: ManagerConfig, store: Arc<dyn DurableStore>) -> Result<Self, ChecksumError> {
        config.validate().map_err(ChecksumError::Config)?;
        info!(
            lru_capacity = config.lru_capacity,
            persist_on_checksum = config.persist_on_checksum,
            "Cache manager created"
        );
        Ok(Self {
            config,
            store,
            resident: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
            locks: KeyedLocks::new(),
            pending: Mutex::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
            closed: AtomicBool::new(false),
        })
    }

    /// Manager over the store named by `config.store_path`, or an in-memory
    /// store when none is configured.
    pub fn open(config: ManagerConfig) -> Result<Self, ChecksumError> {
        let store: Arc<dyn DurableStore> = match &config.store_path {
            Some(path) => Arc::new(SledStore::new(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        Self::new(config, store)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<(), ChecksumError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChecksumError::Internal("cache manager is closed".to_string()));
        }
        Ok(())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    /// Resident context for `id`, dropping it if its stream halted.
    fn lookup(&self, id: &str) -> Option<Arc<CacheContext>> {
        let now = self.tick();
        let mut resident = self.resident.lock();
        let halted = match resident.get_mut(id) {
            Some(slot) if !slot.context.is_halted() => {
                slot.last_used = now;
                return Some(Arc::clone(&slot.context));
            }
            Some(_) => true,
            None => false,
        };
        if halted {
            resident.remove(id);
            drop(resident);
            self.forget_persisted(id);
        }
        None
    }

    /// Context for `source`, creating or restoring it if it is not resident.
    #[instrument(skip(self, source), fields(ref_id = %source.id()))]
    pub async fn get(&self, source: &Arc<dyn Ref>) -> Result<Arc<CacheContext>, ChecksumError> {
        self.ensure_open()?;
        let id = source.id().to_string();
        if let Some(ctx) = self.lookup(&id) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(ctx);
        }

        let _guard = self.locks.lock(&id).await;
        if let Some(ctx) = self.lookup(&id) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(ctx);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        // An evicted or purged context may still be on its way to the store.
        self.settle(&id).await;
        let context = match self.load_snapshot(&id).await? {
            Some(snapshot) => {
                self.counters.store_loads.fetch_add(1, Ordering::Relaxed);
                debug!(records = snapshot.records.len(), "Restored context from store");
                CacheContext::from_snapshot(Arc::clone(source), snapshot, self.config.max_symlink_hops)
            }
            None => CacheContext::new(Arc::clone(source), self.config.max_symlink_hops),
        };
        let context = Arc::new(context);

        let now = self.tick();
        self.resident.lock().insert(
            id,
            Slot {
                context: Arc::clone(&context),
                last_used: now,
            },
        );
        self.evict_idle();
        Ok(context)
    }

    /// Read a persisted snapshot. Read failures are returned; payloads that
    /// cannot be decoded are discarded.
    async fn load_snapshot(&self, id: &str) -> Result<Option<ContextSnapshot>, ChecksumError> {
        let store = Arc::clone(&self.store);
        let key = id.to_string();
        let bytes = tokio::task::spawn_blocking(move || store.get(&key))
            .await
            .map_err(|e| ChecksumError::Internal(format!("store read task failed: {}", e)))??;

        match bytes {
            None => Ok(None),
            Some(bytes) => match ContextSnapshot::decode(&bytes) {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(err) => {
                    warn!(ref_id = %id, error = %err, "Discarding unreadable cache snapshot");
                    Ok(None)
                }
            },
        }
    }

    /// Evict least recently used contexts nobody else holds until the map
    /// fits its capacity again.
    fn evict_idle(&self) {
        let mut evicted = Vec::new();
        {
            let mut resident = self.resident.lock();
            while resident.len() > self.config.lru_capacity {
                let victim = resident
                    .iter()
                    .filter(|(_, slot)| Arc::strong_count(&slot.context) == 1)
                    .min_by_key(|(_, slot)| slot.last_used)
                    .map(|(id, _)| id.clone());
                match victim {
                    Some(id) => {
                        if let Some(slot) = resident.remove(&id) {
                            evicted.push(slot.context);
                        }
                    }
                    None => break,
                }
            }
        }
        for context in evicted {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(ref_id = %context.id(), "Evicted context");
            self.schedule_persist(&context);
        }
    }

    /// Write `context` to the store in the background if it changed.
    fn schedule_persist(&self, context: &Arc<CacheContext>) {
        if context.is_halted() || !context.take_modified() {
            return;
        }
        let snapshot = context.snapshot();
        let store = Arc::clone(&self.store);
        let counters = Arc::clone(&self.counters);
        let key = context.id().to_string();

        self.enqueue(context.id(), move || {
            let result = snapshot.encode().and_then(|bytes| store.put(&key, &bytes));
            match result {
                Ok(()) => {
                    counters.persists.fetch_add(1, Ordering::Relaxed);
                    debug!(ref_id = %key, records = snapshot.records.len(), "Persisted context");
                }
                Err(err) => {
                    counters.persist_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(ref_id = %key, error = %err, "Failed to persist context");
                }
            }
        });
    }

    /// Remove a persisted snapshot that no longer describes the content root.
    fn forget_persisted(&self, id: &str) {
        let store = Arc::clone(&self.store);
        let key = id.to_string();
        self.enqueue(id, move || {
            if let Err(err) = store.delete(&key) {
                warn!(ref_id = %key, error = %err, "Failed to drop persisted context");
            }
        });
    }

    /// Run blocking store `work` for `key` after everything already queued
    /// for that key.
    fn enqueue<F>(&self, key: &str, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        pending.retain(|_, task| task.peek().is_none());
        let previous = pending.remove(key);
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.await;
            }
            if let Err(err) = tokio::task::spawn_blocking(work).await {
                warn!(error = %err, "Background store task failed");
            }
        });
        let task = async move {
            if let Err(err) = handle.await {
                warn!(error = %err, "Background store task failed");
            }
        }
        .boxed()
        .shared();
        pending.insert(key.to_string(), task);
    }

    /// Wait until every store task queued for `key` has finished.
    async fn settle(&self, key: &str) {
        let task = self.pending.lock().get(key).cloned();
        if let Some(task) = task {
            task.await;
        }
    }

    /// Drop a context whose stream halted, unless it was already replaced.
    fn discard_halted(&self, context: &Arc<CacheContext>) {
        let removed = {
            let mut resident = self.resident.lock();
            match resident.get(context.id()) {
                Some(slot) if Arc::ptr_eq(&slot.context, context) => {
                    resident.remove(context.id());
                    true
                }
                _ => false,
            }
        };
        if removed {
            warn!(ref_id = %context.id(), "Dropped halted context");
            self.forget_persisted(context.id());
        }
    }

    fn after_update(&self, context: &Arc<CacheContext>) {
        if context.is_halted() {
            self.discard_halted(context);
        } else if self.config.persist_on_checksum {
            self.schedule_persist(context);
        }
    }

    /// Digest of `path` inside `source`.
    pub async fn checksum(
        &self,
        source: &Arc<dyn Ref>,
        path: &str,
        opts: &ChecksumOpts,
        session: &SessionGroup,
    ) -> Result<Digest, ChecksumError> {
        let context = self.get(source).await?;
        let result = context.checksum(path, opts, session).await;
        self.after_update(&context);
        result
    }

    /// Apply one change record to the context of `source`.
    pub async fn handle_change(
        &self,
        source: &Arc<dyn Ref>,
        change: &Change,
    ) -> Result<(), ChecksumError> {
        let context = self.get(source).await?;
        let result = context.apply(change);
        self.after_update(&context);
        result
    }

    /// Apply a whole change stream to the context of `source`.
    pub async fn apply_stream<I>(
        &self,
        source: &Arc<dyn Ref>,
        changes: I,
    ) -> Result<usize, ChecksumError>
    where
        I: IntoIterator<Item = Result<Change, ChecksumError>>,
    {
        let context = self.get(source).await?;
        let result = context.apply_stream(changes);
        self.after_update(&context);
        result
    }

    /// Drop every resident context. Modified contexts are written to the
    /// store first, so a later [`get`](Self::get) restores what was purged.
    pub async fn purge(&self) {
        let contexts: Vec<Arc<CacheContext>> = {
            let mut resident = self.resident.lock();
            resident.drain().map(|(_, slot)| slot.context).collect()
        };
        for context in &contexts {
            if context.is_halted() {
                self.forget_persisted(context.id());
            } else {
                self.schedule_persist(context);
            }
        }
        self.drain_pending().await;
        info!(contexts = contexts.len(), "Purged cache manager");
    }

    /// Wait for every queued store task.
    async fn drain_pending(&self) {
        let mut tasks: FuturesUnordered<StoreTask> =
            self.pending.lock().values().cloned().collect();
        while tasks.next().await.is_some() {}
        self.pending.lock().retain(|_, task| task.peek().is_none());
    }

    /// Persist every modified resident context and wait for all writes.
    pub async fn flush(&self) -> Result<(), ChecksumError> {
        let contexts: Vec<Arc<CacheContext>> = self
            .resident
            .lock()
            .values()
            .map(|slot| Arc::clone(&slot.context))
            .collect();
        for context in &contexts {
            self.schedule_persist(context);
        }

        self.drain_pending().await;

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.flush())
            .await
            .map_err(|e| ChecksumError::Internal(format!("store flush task failed: {}", e)))?
            .map_err(|e: StoreError| ChecksumError::Store(e))
    }

    /// Flush, then refuse further work.
    pub async fn close(&self) -> Result<(), ChecksumError> {
        let result = self.flush().await;
        self.closed.store(true, Ordering::SeqCst);
        info!("Cache manager closed");
        result
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            resident: self.resident.lock().len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            store_loads: self.counters.store_loads.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            persists: self.counters.persists.load(Ordering::Relaxed),
            persist_failures: self.counters.persist_failures.load(Ordering::Relaxed),
        }
    }
}

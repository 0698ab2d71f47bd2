//! Keyed single-flight work and per-key async locks
//!
//! [`FlightGroup`] collapses concurrent requests for the same key into one
//! spawned task. Every caller waits on its own oneshot receiver; dropping a
//! caller's future only drops that receiver, the shared task keeps running
//! for the remaining waiters.

use crate::error::ChecksumError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type Waiters<V> = Vec<oneshot::Sender<Result<V, ChecksumError>>>;

/// Single-flight registry keyed by string
pub struct FlightGroup<V> {
    inflight: Arc<Mutex<HashMap<String, Waiters<V>>>>,
}

impl<V> Default for FlightGroup<V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Removes a flight whose task ended without delivering a result, so its
/// waiters see a closed channel instead of hanging.
struct FlightGuard<V> {
    inflight: Arc<Mutex<HashMap<String, Waiters<V>>>>,
    key: String,
    armed: bool,
}

impl<V> Drop for FlightGuard<V> {
    fn drop(&mut self) {
        if self.armed {
            self.inflight.lock().remove(&self.key);
        }
    }
}

impl<V> FlightGroup<V>
where
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` under `key`, or join the flight already running for it.
    ///
    /// When a flight is already running, `work` is dropped unpolled.
    pub async fn run<F>(&self, key: &str, work: F) -> Result<V, ChecksumError>
    where
        F: Future<Output = Result<V, ChecksumError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut inflight = self.inflight.lock();
            match inflight.get_mut(key) {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    inflight.insert(key.to_string(), vec![tx]);
                    true
                }
            }
        };

        if leader {
            let inflight = Arc::clone(&self.inflight);
            let owned_key = key.to_string();
            tokio::spawn(async move {
                let mut guard = FlightGuard {
                    inflight: Arc::clone(&inflight),
                    key: owned_key.clone(),
                    armed: true,
                };
                let result = work.await;
                let waiters = inflight.lock().remove(&owned_key).unwrap_or_default();
                guard.armed = false;
                trace!(key = %owned_key, waiters = waiters.len(), "Flight completed");
                for tx in waiters {
                    let _ = tx.send(result.clone());
                }
            });
        } else {
            trace!(key = %key, "Joined in-flight work");
        }

        rx.await.map_err(|_| {
            ChecksumError::Internal(format!("shared work for {} ended without a result", key))
        })?
    }

    /// Whether a flight for `key` is currently running.
    pub fn in_flight(&self, key: &str) -> bool {
        self.inflight.lock().contains_key(key)
    }
}

/// One async mutex per key; idle keys are pruned on the next acquisition.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            Arc::clone(
                locks
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

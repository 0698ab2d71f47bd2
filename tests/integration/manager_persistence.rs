//! Cache manager: LRU, persistence and reload

use super::test_utils::{checksum, dir_ref, fixture, stream_context, UnmountableRef};
use std::sync::Arc;
use tempfile::TempDir;
use treesum::config::ManagerConfig;
use treesum::store::{ContextSnapshot, DurableStore, MemoryStore, SledStore};
use treesum::{
    CacheManager, Change, ChangeInfo, ChecksumOpts, FileStat, Ref, SessionGroup, StoreError,
};

fn config(capacity: usize) -> ManagerConfig {
    ManagerConfig {
        lru_capacity: capacity,
        ..ManagerConfig::default()
    }
}

async fn root_digest(manager: &CacheManager, source: &Arc<dyn Ref>) -> treesum::Digest {
    manager
        .checksum(source, "/", &ChecksumOpts::follow(), &SessionGroup::default())
        .await
        .unwrap()
}

fn file(content: &str) -> ChangeInfo {
    ChangeInfo::file(FileStat::regular(0o644, content.len() as u64), content.as_bytes())
}

fn dir() -> ChangeInfo {
    ChangeInfo::stat_only(FileStat::directory(0o755))
}

#[tokio::test]
async fn test_purge_then_reload_without_mounting() {
    let temp = fixture(&[("foo", "data0"), ("bar", "data1")]);
    let manager = CacheManager::new(config(4), Arc::new(MemoryStore::new())).unwrap();

    let source = dir_ref("snapshot-1", temp.path());
    let scanned = root_digest(&manager, &source).await;
    manager.flush().await.unwrap();
    manager.purge().await;
    source.release().await.unwrap();

    let reacquired: Arc<dyn Ref> = Arc::new(UnmountableRef::new("snapshot-1"));
    assert_eq!(root_digest(&manager, &reacquired).await, scanned);
    let stats = manager.stats();
    assert_eq!(stats.store_loads, 1);
    assert!(stats.persists >= 1);
}

#[tokio::test]
async fn test_stream_context_survives_round_trip() {
    let manager = CacheManager::new(config(4), Arc::new(MemoryStore::new())).unwrap();
    let source: Arc<dyn Ref> = Arc::new(UnmountableRef::new("stream-1"));

    manager.handle_change(&source, &Change::add("foo", file("data0"))).await.unwrap();
    manager.handle_change(&source, &Change::add("bar", file("data1"))).await.unwrap();
    let before = root_digest(&manager, &source).await;

    manager.flush().await.unwrap();
    manager.purge().await;
    assert_eq!(root_digest(&manager, &source).await, before);
}

#[tokio::test]
async fn test_change_after_flush_survives_purge() {
    let manager = CacheManager::new(config(4), Arc::new(MemoryStore::new())).unwrap();
    let source: Arc<dyn Ref> = Arc::new(UnmountableRef::new("stream-2"));

    let changes = vec![Ok(Change::add("d", dir())), Ok(Change::add("d/foo", file("data0")))];
    manager.apply_stream(&source, changes).await.unwrap();
    manager.flush().await.unwrap();
    manager.handle_change(&source, &Change::add("d/bar", file("data1"))).await.unwrap();
    manager.purge().await;

    let reference = stream_context("reference");
    reference.apply(&Change::add("d", dir())).unwrap();
    reference.apply(&Change::add("d/foo", file("data0"))).unwrap();
    reference.apply(&Change::add("d/bar", file("data1"))).unwrap();

    let reacquired: Arc<dyn Ref> = Arc::new(UnmountableRef::new("stream-2"));
    let reloaded = manager
        .checksum(&reacquired, "/d", &ChecksumOpts::follow(), &SessionGroup::default())
        .await
        .unwrap();
    assert_eq!(reloaded, checksum(&reference, "/d").await.unwrap());
    assert_eq!(manager.stats().store_loads, 1);
}

#[tokio::test]
async fn test_purge_without_persist_on_checksum_still_saves() {
    let store = Arc::new(MemoryStore::new());
    let manager = CacheManager::new(
        ManagerConfig {
            persist_on_checksum: false,
            ..config(4)
        },
        store.clone(),
    )
    .unwrap();
    let source: Arc<dyn Ref> = Arc::new(UnmountableRef::new("lazy"));

    manager.handle_change(&source, &Change::add("foo", file("data0"))).await.unwrap();
    assert!(store.get("lazy").unwrap().is_none());
    manager.purge().await;
    assert!(store.get("lazy").unwrap().is_some());
}

#[tokio::test]
async fn test_evicted_stream_reloads_immediately() {
    let manager = CacheManager::new(config(1), Arc::new(MemoryStore::new())).unwrap();
    let a: Arc<dyn Ref> = Arc::new(UnmountableRef::new("a"));
    let b: Arc<dyn Ref> = Arc::new(UnmountableRef::new("b"));

    manager.handle_change(&a, &Change::add("foo", file("data0"))).await.unwrap();
    let before = root_digest(&manager, &a).await;
    manager.handle_change(&b, &Change::add("bar", file("data1"))).await.unwrap();
    assert_eq!(manager.stats().evictions, 1);

    // No flush: the reload must wait for the eviction's write.
    assert_eq!(root_digest(&manager, &a).await, before);
    assert_eq!(manager.stats().store_loads, 1);
}

#[tokio::test]
async fn test_eviction_persists_and_reloads() {
    let first = fixture(&[("foo", "data0")]);
    let second = fixture(&[("bar", "data1")]);
    let manager = CacheManager::new(config(1), Arc::new(MemoryStore::new())).unwrap();

    let a = root_digest(&manager, &dir_ref("a", first.path())).await;
    root_digest(&manager, &dir_ref("b", second.path())).await;
    assert!(manager.stats().evictions >= 1);
    manager.flush().await.unwrap();

    let a_again: Arc<dyn Ref> = Arc::new(UnmountableRef::new("a"));
    assert_eq!(root_digest(&manager, &a_again).await, a);
}

#[tokio::test]
async fn test_sled_store_survives_manager_restart() {
    let data = fixture(&[("foo", "data0"), ("bar", "data1")]);
    let db_dir = TempDir::new().unwrap();
    let store = Arc::new(SledStore::new(db_dir.path().join("cache.db")).unwrap());

    let scanned = {
        let manager = CacheManager::new(config(4), store.clone()).unwrap();
        let digest = root_digest(&manager, &dir_ref("persisted", data.path())).await;
        manager.close().await.unwrap();
        digest
    };

    let manager = CacheManager::new(config(4), store).unwrap();
    let reacquired: Arc<dyn Ref> = Arc::new(UnmountableRef::new("persisted"));
    assert_eq!(root_digest(&manager, &reacquired).await, scanned);
    assert_eq!(manager.stats().store_loads, 1);
}

#[tokio::test]
async fn test_open_uses_configured_store_path() {
    let db_dir = TempDir::new().unwrap();
    let manager = CacheManager::open(ManagerConfig {
        store_path: Some(db_dir.path().join("cache.db")),
        ..ManagerConfig::default()
    })
    .unwrap();
    manager.close().await.unwrap();
    assert!(db_dir.path().join("cache.db").exists());
}

#[tokio::test]
async fn test_unreadable_snapshot_is_rebuilt() {
    let temp = fixture(&[("foo", "data0")]);
    let store = Arc::new(MemoryStore::new());
    store.put("corrupt", b"not a snapshot").unwrap();
    let manager = CacheManager::new(config(4), store.clone()).unwrap();

    let digest = root_digest(&manager, &dir_ref("corrupt", temp.path())).await;
    assert_eq!(manager.stats().store_loads, 0);

    manager.flush().await.unwrap();
    let bytes = store.get("corrupt").unwrap().unwrap();
    assert!(ContextSnapshot::decode(&bytes).is_ok());

    let fresh = CacheManager::new(config(4), Arc::new(MemoryStore::new())).unwrap();
    assert_eq!(root_digest(&fresh, &dir_ref("other", temp.path())).await, digest);
}

/// Store whose writes always fail.
struct ReadOnlyStore;

impl DurableStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::Io("read-only".to_string()))
    }

    fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_persist_failure_does_not_fail_checksum() {
    let temp = fixture(&[("foo", "data0")]);
    let manager = CacheManager::new(config(4), Arc::new(ReadOnlyStore)).unwrap();

    root_digest(&manager, &dir_ref("ro", temp.path())).await;
    manager.flush().await.unwrap();
    assert_eq!(manager.stats().persist_failures, 1);
}

#[tokio::test]
async fn test_halted_stream_is_not_persisted() {
    let store = Arc::new(MemoryStore::new());
    let manager = CacheManager::new(config(4), store.clone()).unwrap();
    let source: Arc<dyn Ref> = Arc::new(UnmountableRef::new("halting"));

    let changes = vec![
        Ok(Change::add("foo", file("data0"))),
        Ok(Change::add("bad", ChangeInfo::stat_only(FileStat::regular(0o644, 1)))),
    ];
    assert!(manager.apply_stream(&source, changes).await.is_err());
    manager.flush().await.unwrap();

    assert!(store.get("halting").unwrap().is_none());
    assert_eq!(manager.stats().resident, 0);
}

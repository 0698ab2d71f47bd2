//! Property-based tests for determinism guarantees

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use treesum::{
    CacheContext, Change, ChangeInfo, ChecksumOpts, DirRef, Digest, Filesystem, LocalFs,
    SessionGroup,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Small trees: up to two directory levels, short names, short contents.
fn tree_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    let name = "[a-c]{1,2}";
    let path = prop::collection::vec(name, 1..=3).prop_map(|parts| parts.join("/"));
    prop::collection::btree_map(path, prop::collection::vec(any::<u8>(), 0..16), 1..8)
        .prop_map(|files| {
            // Drop files that would need to be a directory for another entry.
            let keys: Vec<String> = files.keys().cloned().collect();
            files
                .into_iter()
                .filter(|(p, _)| !keys.iter().any(|k| k.starts_with(&format!("{}/", p))))
                .collect()
        })
}

fn materialize(files: &BTreeMap<String, Vec<u8>>) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (p, content) in files {
        let target = temp.path().join(p);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, content).unwrap();
    }
    temp
}

/// Every entry below the root, parents before children.
fn entries(files: &BTreeMap<String, Vec<u8>>) -> Vec<String> {
    let mut all = std::collections::BTreeSet::new();
    for p in files.keys() {
        let parts: Vec<&str> = p.split('/').collect();
        for i in 1..=parts.len() {
            all.insert(format!("/{}", parts[..i].join("/")));
        }
    }
    let mut ordered: Vec<String> = all.into_iter().collect();
    ordered.sort_by_key(|p| p.matches('/').count());
    ordered
}

fn replay(temp: &TempDir, order: &[String]) -> CacheContext {
    let lfs = LocalFs::new(temp.path());
    let ctx = CacheContext::new(Arc::new(DirRef::new("replay", "/nonexistent/treesum")), 255);
    for p in order {
        let stat = lfs.lstat(p).unwrap();
        let info = if stat.is_regular() {
            let content = fs::read(temp.path().join(p.trim_start_matches('/'))).unwrap();
            ChangeInfo::file(stat, &content)
        } else {
            ChangeInfo::stat_only(stat)
        };
        ctx.apply(&Change::add(p.as_str(), info)).unwrap();
    }
    ctx
}

async fn root(ctx: &CacheContext) -> Digest {
    ctx.checksum("/", &ChecksumOpts::follow(), &SessionGroup::default())
        .await
        .unwrap()
}

/// A fresh scan and a replayed change stream agree on the root digest.
#[test]
fn test_scan_equals_stream_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(32));
    let rt = runtime();

    runner
        .run(&tree_strategy(), |files| {
            let temp = materialize(&files);
            let order = entries(&files);
            let mut reversed = order.clone();
            reversed.reverse();

            let scanned = rt.block_on(root(&CacheContext::new(
                Arc::new(DirRef::new("scan", temp.path())),
                255,
            )));
            let forward = rt.block_on(root(&replay(&temp, &order)));
            // Children before parents is a valid differ order too.
            let backward = rt.block_on(root(&replay(&temp, &reversed)));

            prop_assert_eq!(&scanned, &forward);
            prop_assert_eq!(&scanned, &backward);
            Ok(())
        })
        .unwrap();
}

/// Two scans of equal trees in different locations agree.
#[test]
fn test_location_independence_property() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(16));
    let rt = runtime();

    runner
        .run(&tree_strategy(), |files| {
            let first = materialize(&files);
            let second = materialize(&files);
            let a = rt.block_on(root(&CacheContext::new(Arc::new(DirRef::new("a", first.path())), 255)));
            let b = rt.block_on(root(&CacheContext::new(Arc::new(DirRef::new("b", second.path())), 255)));
            prop_assert_eq!(a, b);
            Ok(())
        })
        .unwrap();
}

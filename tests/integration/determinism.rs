//! Scan mode and stream mode agree on the same tree

use super::test_utils::{checksum, context, fixture, stream_context};
use std::fs;
use std::path::Path;
use treesum::{CacheContext, Change, ChangeInfo, Filesystem, LocalFs};

/// Replay the entries of `root` as Add records in the given order.
fn replay(root: &Path, order: &[&str]) -> CacheContext {
    let lfs = LocalFs::new(root);
    let ctx = stream_context("replay");
    for entry in order {
        let stat = lfs.lstat(entry).unwrap();
        let info = if stat.is_regular() {
            let content = fs::read(root.join(entry.trim_start_matches('/'))).unwrap();
            ChangeInfo::file(stat, &content)
        } else {
            ChangeInfo::stat_only(stat)
        };
        ctx.apply(&Change::add(*entry, info)).unwrap();
    }
    ctx
}

#[tokio::test]
async fn test_scan_equals_stream_in_either_order() {
    let temp = fixture(&[("foo", "data0"), ("bar", "data1")]);
    let scanned = checksum(&context(temp.path()), "/").await.unwrap();

    let forward = replay(temp.path(), &["/foo", "/bar"]);
    let backward = replay(temp.path(), &["/bar", "/foo"]);
    assert_eq!(checksum(&forward, "/").await.unwrap(), scanned);
    assert_eq!(checksum(&backward, "/").await.unwrap(), scanned);
}

#[tokio::test]
async fn test_scan_equals_stream_for_nested_tree() {
    let temp = fixture(&[("a/b/c", "deep"), ("a/d", "mid"), ("e/", "")]);
    std::os::unix::fs::symlink("../a/d", temp.path().join("e/link")).unwrap();

    let scan_ctx = context(temp.path());
    let replayed = replay(
        temp.path(),
        &["/a", "/a/b", "/a/b/c", "/a/d", "/e", "/e/link"],
    );
    for query in ["/", "/a", "/a/b", "/e", "/e/link"] {
        assert_eq!(
            checksum(&scan_ctx, query).await.unwrap(),
            checksum(&replayed, query).await.unwrap(),
            "{}",
            query
        );
    }
}

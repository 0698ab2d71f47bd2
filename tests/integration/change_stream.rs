//! Stream mode: change records from a differ

use super::test_utils::{checksum, stream_context};
use treesum::{Change, ChangeInfo, ChecksumError, FileStat};

fn file(content: &str) -> ChangeInfo {
    ChangeInfo::file(FileStat::regular(0o644, content.len() as u64), content.as_bytes())
}

fn dir() -> ChangeInfo {
    ChangeInfo::stat_only(FileStat::directory(0o755))
}

#[tokio::test]
async fn test_delete_propagates_to_children() {
    let ctx = stream_context("delete");
    ctx.apply(&Change::add("d0", dir())).unwrap();
    ctx.apply(&Change::add("d0/child", file("data"))).unwrap();
    assert!(checksum(&ctx, "/d0/child").await.is_ok());

    ctx.apply(&Change::delete("d0")).unwrap();
    ctx.apply(&Change::delete("d0/child")).unwrap();

    assert!(checksum(&ctx, "/d0").await.unwrap_err().is_not_found());
    assert!(checksum(&ctx, "/d0/child").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_modify_invalidates_ancestors() {
    let ctx = stream_context("modify");
    ctx.apply(&Change::add("d", dir())).unwrap();
    ctx.apply(&Change::add("d/e", dir())).unwrap();
    ctx.apply(&Change::add("d/e/f", file("one"))).unwrap();
    let root = checksum(&ctx, "/").await.unwrap();
    let mid = checksum(&ctx, "/d").await.unwrap();

    ctx.apply(&Change::modify("d/e/f", file("two"))).unwrap();
    assert_ne!(checksum(&ctx, "/").await.unwrap(), root);
    assert_ne!(checksum(&ctx, "/d").await.unwrap(), mid);
}

#[tokio::test]
async fn test_directory_replaced_by_file_drops_subtree() {
    let ctx = stream_context("replace");
    ctx.apply(&Change::add("x", dir())).unwrap();
    ctx.apply(&Change::add("x/inner", file("data"))).unwrap();
    ctx.apply(&Change::modify("x", file("now a file"))).unwrap();

    assert!(checksum(&ctx, "/x/inner").await.unwrap_err().is_not_found());
    assert_eq!(ctx.len(), 2);
}

#[tokio::test]
async fn test_child_before_parent_becomes_visible() {
    let ctx = stream_context("orphan");
    ctx.apply(&Change::add("p/c", file("data"))).unwrap();
    assert!(checksum(&ctx, "/p/c").await.unwrap_err().is_not_found());

    ctx.apply(&Change::add("p", dir())).unwrap();
    assert!(checksum(&ctx, "/p/c").await.is_ok());
}

#[tokio::test]
async fn test_malformed_record_halts_context() {
    let ctx = stream_context("halt");
    ctx.apply(&Change::add("ok", file("fine"))).unwrap();

    let missing_digest = Change::add("bad", ChangeInfo::stat_only(FileStat::regular(0o644, 4)));
    let err = ctx.apply(&missing_digest).unwrap_err();
    assert!(matches!(err, ChecksumError::MalformedChange { .. }));

    assert!(matches!(
        ctx.apply(&Change::add("later", file("x"))).unwrap_err(),
        ChecksumError::StreamHalted(_)
    ));
    assert!(matches!(
        checksum(&ctx, "/ok").await.unwrap_err(),
        ChecksumError::StreamHalted(_)
    ));
}

#[tokio::test]
async fn test_stream_error_item_halts() {
    let ctx = stream_context("error-item");
    let changes = vec![
        Ok(Change::add("a", file("a"))),
        Err(ChecksumError::Internal("differ failed".to_string())),
        Ok(Change::add("b", file("b"))),
    ];
    assert!(ctx.apply_stream(changes).is_err());
    assert!(ctx.is_halted());
    assert!(checksum(&ctx, "/a").await.is_err());
}

#[tokio::test]
async fn test_apply_stream_counts_records() {
    let ctx = stream_context("count");
    let changes = vec![
        Ok(Change::add("a", dir())),
        Ok(Change::add("a/b", file("b"))),
        Ok(Change::delete("a/b")),
    ];
    assert_eq!(ctx.apply_stream(changes).unwrap(), 3);
    assert_eq!(checksum(&ctx, "/a").await.unwrap(), treesum::Digest::empty());
}

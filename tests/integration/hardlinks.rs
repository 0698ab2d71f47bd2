//! Hardlinked files in scan and stream mode

use super::test_utils::{checksum, context, fixture, stream_context};
use std::fs;
use treesum::{Change, ChangeInfo, FileStat};

#[tokio::test]
async fn test_scanned_aliases_share_digest() {
    let temp = fixture(&[("a", "shared"), ("dir/", "")]);
    fs::hard_link(temp.path().join("a"), temp.path().join("dir/b")).unwrap();

    let ctx = context(temp.path());
    checksum(&ctx, "/").await.unwrap();
    assert_eq!(
        checksum(&ctx, "/a").await.unwrap(),
        checksum(&ctx, "/dir/b").await.unwrap()
    );
}

#[tokio::test]
async fn test_in_place_change_moves_both_aliases() {
    let temp = fixture(&[("a", "one")]);
    fs::hard_link(temp.path().join("a"), temp.path().join("b")).unwrap();
    let before = checksum(&context(temp.path()), "/b").await.unwrap();

    fs::write(temp.path().join("a"), "two").unwrap();
    let ctx = context(temp.path());
    let a = checksum(&ctx, "/a").await.unwrap();
    let b = checksum(&ctx, "/b").await.unwrap();
    assert_eq!(a, b);
    assert_ne!(b, before);
}

fn file(content: &str) -> ChangeInfo {
    ChangeInfo::file(FileStat::regular(0o644, content.len() as u64), content.as_bytes())
}

fn link_to(source: &str) -> ChangeInfo {
    let mut stat = FileStat::regular(0o644, 0);
    stat.linkname = source.to_string();
    ChangeInfo::stat_only(stat)
}

#[tokio::test]
async fn test_stream_alias_copies_source() {
    let ctx = stream_context("links");
    ctx.apply(&Change::add("a", file("shared"))).unwrap();
    ctx.apply(&Change::add("b", link_to("/a"))).unwrap();

    assert_eq!(
        checksum(&ctx, "/a").await.unwrap(),
        checksum(&ctx, "/b").await.unwrap()
    );
}

#[tokio::test]
async fn test_stream_source_update_reaches_aliases() {
    let ctx = stream_context("links");
    ctx.apply(&Change::add("a", file("one"))).unwrap();
    ctx.apply(&Change::add("b", link_to("/a"))).unwrap();
    ctx.apply(&Change::modify("a", file("two"))).unwrap();

    let a = checksum(&ctx, "/a").await.unwrap();
    assert_eq!(a, checksum(&ctx, "/b").await.unwrap());

    let reference = stream_context("reference");
    reference.apply(&Change::add("x", file("two"))).unwrap();
    assert_eq!(a, checksum(&reference, "/x").await.unwrap());
}

#[tokio::test]
async fn test_repointed_alias_changes_alone() {
    let ctx = stream_context("links");
    ctx.apply(&Change::add("a", file("one"))).unwrap();
    ctx.apply(&Change::add("c", file("other"))).unwrap();
    ctx.apply(&Change::add("b", link_to("/a"))).unwrap();
    let a_before = checksum(&ctx, "/a").await.unwrap();

    ctx.reset_link_map();
    ctx.apply(&Change::modify("b", link_to("/c"))).unwrap();

    assert_eq!(checksum(&ctx, "/a").await.unwrap(), a_before);
    assert_eq!(
        checksum(&ctx, "/b").await.unwrap(),
        checksum(&ctx, "/c").await.unwrap()
    );
}

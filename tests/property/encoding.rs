//! Property-based tests for the hashed-stat encoder

use proptest::prelude::*;
use treesum::tree::hasher::{compose, hash_stat_with_content, StatHasher};
use treesum::{Digest, FileStat};

/// Header digests depend on every identity field.
#[test]
fn test_header_fields_are_injective_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(0u32..0o7777, any::<u32>(), any::<u32>(), any::<u32>()),
            |(perm, uid, other_uid, gid)| {
                let mut a = FileStat::regular(perm, 0);
                a.uid = uid;
                a.gid = gid;
                let mut b = a.clone();
                b.uid = other_uid;

                let da = StatHasher::from_stat(&a).finish();
                let db = StatHasher::from_stat(&b).finish();
                if uid == other_uid {
                    prop_assert_eq!(da, db);
                } else {
                    prop_assert_ne!(da, db);
                }
                Ok(())
            },
        )
        .unwrap();
}

/// Moving bytes between an xattr name and its value changes the digest.
#[test]
fn test_xattr_framing_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&("[a-z]{2,6}", "[a-z]{1,6}"), |(name, value)| {
            let split = name.len() - 1;
            let mut a = FileStat::directory(0o755);
            a.xattrs
                .insert(format!("user.{}", name), value.clone().into_bytes());
            let mut b = FileStat::directory(0o755);
            b.xattrs.insert(
                format!("user.{}", &name[..split]),
                format!("{}{}", &name[split..], value).into_bytes(),
            );
            prop_assert_ne!(StatHasher::from_stat(&a).finish(), StatHasher::from_stat(&b).finish());
            Ok(())
        })
        .unwrap();
}

/// File content is part of the digest.
#[test]
fn test_content_changes_digest_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(any::<Vec<u8>>(), any::<Vec<u8>>()),
            |(content1, content2)| {
                let stat = FileStat::regular(0o644, 0);
                let d1 = hash_stat_with_content(&stat, &content1);
                let d2 = hash_stat_with_content(&stat, &content2);
                if content1 == content2 {
                    prop_assert_eq!(d1, d2);
                } else {
                    prop_assume!(d1 != d2);
                }
                Ok(())
            },
        )
        .unwrap();
}

/// Composition keeps the boundary between names and digests.
#[test]
fn test_compose_is_unambiguous_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&("[a-z]{1,8}", "[a-z]{1,8}"), |(left, right)| {
            prop_assume!(left != right);
            let d = Digest::from_bytes(b"same");
            let a = compose([(left.as_bytes(), &d)]);
            let b = compose([(right.as_bytes(), &d)]);
            prop_assert_ne!(a, b);
            Ok(())
        })
        .unwrap();
}

//! Hashed-stat encoding and digest composition using BLAKE3
//!
//! A leaf digest covers one entry's metadata header followed, for regular
//! files, by the file bytes:
//!
//! digest = hash(header || content)
//!
//! The header is an ordered list of framed (key, value) pairs. Every field is
//! length-prefixed (8 bytes, big-endian) so distinct entries never share a
//! pre-image. The entry's own name is always encoded empty; the parent
//! composes names in.

use crate::mount::Filesystem;
use crate::tree::node::{FileKind, FileStat};
use crate::types::Digest;
use blake3::Hasher;
use std::io::{self, Write};

/// Extended attribute namespaces left out of the header, except for
/// `security.capability`.
const IGNORED_XATTR_PREFIXES: &[&str] = &["security.", "system."];
const KEPT_XATTR: &str = "security.capability";

/// Running hash over one entry: header first, then streamed bytes.
pub struct StatHasher {
    hasher: Hasher,
}

impl StatHasher {
    /// Start a hash for `stat`, writing its header.
    pub fn from_stat(stat: &FileStat) -> Self {
        let mut hasher = Hasher::new();
        for (key, value) in encode_header(stat) {
            write_framed(&mut hasher, key.as_bytes());
            write_framed(&mut hasher, &value);
        }
        Self { hasher }
    }

    /// Finalize into an `algorithm:hex` digest.
    pub fn finish(&self) -> Digest {
        Digest::from_hash(self.hasher.finalize().as_bytes())
    }
}

impl Write for StatHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn write_framed(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn keep_xattr(name: &str) -> bool {
    name == KEPT_XATTR || !IGNORED_XATTR_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Ordered header fields for `stat`.
///
/// Timestamps are never encoded. Sizes only count for regular files, and the
/// link name only for symlinks.
pub fn encode_header(stat: &FileStat) -> Vec<(String, Vec<u8>)> {
    let kind = stat.kind();
    let size = if kind == FileKind::Regular { stat.size } else { 0 };
    let linkname = if kind == FileKind::Symlink {
        stat.linkname.as_str()
    } else {
        ""
    };

    let mut fields: Vec<(String, Vec<u8>)> = vec![
        ("name".to_string(), Vec::new()),
        ("mode".to_string(), format!("{:o}", stat.permissions()).into_bytes()),
        ("uid".to_string(), stat.uid.to_string().into_bytes()),
        ("gid".to_string(), stat.gid.to_string().into_bytes()),
        ("size".to_string(), size.to_string().into_bytes()),
        ("typeflag".to_string(), kind.typeflag().to_string().into_bytes()),
        ("linkname".to_string(), linkname.as_bytes().to_vec()),
        ("uname".to_string(), stat.uname.as_bytes().to_vec()),
        ("gname".to_string(), stat.gname.as_bytes().to_vec()),
        ("devmajor".to_string(), stat.devmajor.to_string().into_bytes()),
        ("devminor".to_string(), stat.devminor.to_string().into_bytes()),
    ];

    // BTreeMap iteration is already key-ordered
    for (name, value) in stat.xattrs.iter() {
        if keep_xattr(name) {
            fields.push((format!("xattr.{}", name), value.clone()));
        }
    }

    fields
}

/// Leaf digest of the entry at `path`, reading file bytes through `fs`.
pub fn hash_entry(fs: &dyn Filesystem, path: &str, stat: &FileStat) -> io::Result<Digest> {
    let mut hasher = StatHasher::from_stat(stat);
    if stat.kind() == FileKind::Regular {
        let mut reader = fs.open(path)?;
        io::copy(&mut reader, &mut hasher)?;
    }
    Ok(hasher.finish())
}

/// Leaf digest from a stat and in-memory content.
pub fn hash_stat_with_content(stat: &FileStat, content: &[u8]) -> Digest {
    let mut hasher = StatHasher::from_stat(stat);
    if stat.kind() == FileKind::Regular {
        hasher.hasher.update(content);
    }
    hasher.finish()
}

/// Compose an ordered sequence of (key, digest) pairs into one digest.
///
/// Callers pass entries already sorted by key. An empty sequence yields
/// [`Digest::empty`].
pub fn compose<'a, I>(entries: I) -> Digest
where
    I: IntoIterator<Item = (&'a [u8], &'a Digest)>,
{
    let mut hasher = Hasher::new();
    for (key, digest) in entries {
        write_framed(&mut hasher, key);
        write_framed(&mut hasher, digest.as_bytes());
    }
    Digest::from_hash(hasher.finalize().as_bytes())
}

//! Filesystem entry metadata and cached per-path records

use crate::types::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File type bits (`S_IFMT`) of a Unix mode.
pub const MODE_TYPE_MASK: u32 = 0o170_000;
const MODE_SOCKET: u32 = 0o140_000;
const MODE_SYMLINK: u32 = 0o120_000;
const MODE_REGULAR: u32 = 0o100_000;
const MODE_BLOCK: u32 = 0o060_000;
const MODE_DIR: u32 = 0o040_000;
const MODE_CHAR: u32 = 0o020_000;
const MODE_FIFO: u32 = 0o010_000;

/// Entry kind as seen by the hasher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl FileKind {
    /// Derive the kind from the type bits of a Unix mode.
    ///
    /// A mode without type bits is treated as a regular file.
    pub fn from_mode(mode: u32) -> Self {
        match mode & MODE_TYPE_MASK {
            MODE_DIR => FileKind::Directory,
            MODE_SYMLINK => FileKind::Symlink,
            MODE_CHAR => FileKind::CharDevice,
            MODE_BLOCK => FileKind::BlockDevice,
            MODE_FIFO => FileKind::Fifo,
            MODE_SOCKET => FileKind::Socket,
            _ => FileKind::Regular,
        }
    }

    pub fn mode_bits(self) -> u32 {
        match self {
            FileKind::Regular => MODE_REGULAR,
            FileKind::Directory => MODE_DIR,
            FileKind::Symlink => MODE_SYMLINK,
            FileKind::CharDevice => MODE_CHAR,
            FileKind::BlockDevice => MODE_BLOCK,
            FileKind::Fifo => MODE_FIFO,
            FileKind::Socket => MODE_SOCKET,
        }
    }

    /// Archive type flag. Sockets have no archive representation and are
    /// encoded as regular entries.
    pub fn typeflag(self) -> char {
        match self {
            FileKind::Regular | FileKind::Socket => '0',
            FileKind::Symlink => '2',
            FileKind::CharDevice => '3',
            FileKind::BlockDevice => '4',
            FileKind::Directory => '5',
            FileKind::Fifo => '6',
        }
    }
}

/// Metadata of one filesystem entry, as produced by a mount or a differ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Unix mode including the file type bits
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// Symlink target, or for regular files in a change stream the path of
    /// the entry this one is a hardlink of.
    pub linkname: String,
    pub uname: String,
    pub gname: String,
    pub devmajor: u64,
    pub devminor: u64,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    /// Device and inode, when the backend exposes them
    pub inode: Option<(u64, u64)>,
    pub nlink: u64,
}

impl FileStat {
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    /// Permission bits including setuid, setgid and sticky.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind() == FileKind::Symlink
    }

    pub fn is_regular(&self) -> bool {
        self.kind() == FileKind::Regular
    }

    /// Convenience constructor for a regular file stat.
    pub fn regular(perm: u32, size: u64) -> Self {
        Self {
            mode: MODE_REGULAR | (perm & 0o7777),
            size,
            nlink: 1,
            ..Self::default()
        }
    }

    pub fn directory(perm: u32) -> Self {
        Self {
            mode: MODE_DIR | (perm & 0o7777),
            nlink: 1,
            ..Self::default()
        }
    }

    pub fn symlink(target: &str) -> Self {
        Self {
            mode: MODE_SYMLINK | 0o777,
            linkname: target.to_string(),
            nlink: 1,
            ..Self::default()
        }
    }
}

/// Record kind stored in the path index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl From<FileKind> for RecordKind {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Regular => RecordKind::File,
            FileKind::Directory => RecordKind::Directory,
            FileKind::Symlink => RecordKind::Symlink,
            _ => RecordKind::Other,
        }
    }
}

/// One cached entry of a content root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub kind: RecordKind,
    /// Symlink target (empty for everything else)
    pub linkname: String,
    /// Digest of this entry alone: metadata, plus bytes for regular files
    pub digest: Digest,
    /// Composed digest of a directory's contents; `None` while stale
    pub contents: Option<Digest>,
}

impl CacheRecord {
    pub fn new(kind: RecordKind, linkname: String, digest: Digest) -> Self {
        Self {
            kind,
            linkname,
            digest,
            contents: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == RecordKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == RecordKind::Symlink
    }
}

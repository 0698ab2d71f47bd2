//! Treesum: Content-Addressable Directory Checksums
//!
//! Computes stable digests for files, symlinks and whole directory trees
//! inside mountable snapshots. Digests are cached per snapshot in an
//! incremental tree that is filled lazily from the filesystem or from a
//! differ's change stream, and persisted across restarts.

pub mod concurrency;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod manager;
pub mod mount;
pub mod pattern;
pub mod store;
pub mod tree;
pub mod types;

pub use context::{CacheContext, Change, ChangeInfo, ChangeKind};
pub use error::{ChecksumError, StoreError};
pub use manager::{CacheManager, ManagerStats};
pub use mount::{DirRef, Filesystem, LocalFs, Mountable, Ref, SessionGroup};
pub use tree::node::{FileKind, FileStat};
pub use types::{ChecksumOpts, Digest};

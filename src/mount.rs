//! Mounted filesystem views and the content roots that produce them
//!
//! A [`Ref`] identifies a content root and can be mounted into a
//! [`Filesystem`]. All paths handed to a `Filesystem` are canonical
//! slash-rooted paths (see [`crate::tree::path::clean`]) interpreted relative
//! to the mount root, never the host root.

use crate::error::ChecksumError;
use crate::tree::node::FileStat;
use crate::tree::path;
use async_trait::async_trait;
use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Read-only view of a mounted content root.
pub trait Filesystem: Send + Sync {
    /// Metadata of `path` without following a final symlink.
    fn lstat(&self, path: &str) -> io::Result<FileStat>;

    /// Names of the entries in directory `path`, sorted by byte value.
    fn read_dir(&self, path: &str) -> io::Result<Vec<String>>;

    /// Open a regular file for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Visit `root` and everything below it in pre-order, children in name
    /// order, without following symlinks.
    fn walk(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&str, &FileStat) -> io::Result<()>,
    ) -> io::Result<()> {
        let stat = self.lstat(root)?;
        visit(root, &stat)?;
        if stat.is_dir() {
            for name in self.read_dir(root)? {
                self.walk(&path::join(root, &name), visit)?;
            }
        }
        Ok(())
    }
}

/// Opaque session identifiers forwarded to a mount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionGroup {
    ids: Vec<String>,
}

impl SessionGroup {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Capability to obtain a live filesystem view.
#[async_trait]
pub trait Mountable: Send + Sync {
    async fn mount(
        &self,
        readonly: bool,
        session: &SessionGroup,
    ) -> Result<Arc<dyn Filesystem>, ChecksumError>;
}

/// A content root with a stable identity.
#[async_trait]
pub trait Ref: Mountable {
    /// Identity used as the cache key.
    fn id(&self) -> &str;

    async fn release(&self) -> Result<(), ChecksumError>;

    async fn commit(&self) -> Result<Arc<dyn Ref>, ChecksumError>;
}

/// [`Filesystem`] backed by a host directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> PathBuf {
        let cleaned = path::clean(path);
        let rel = cleaned.trim_start_matches('/');
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    /// Canonical path of a host path below the root.
    fn logical_path(&self, host: &Path) -> String {
        match host.strip_prefix(&self.root) {
            Ok(rel) => path::clean(&rel.to_string_lossy()),
            Err(_) => "/".to_string(),
        }
    }

    fn stat_host(&self, host: &Path) -> io::Result<FileStat> {
        let meta = fs::symlink_metadata(host)?;
        let linkname = if meta.file_type().is_symlink() {
            fs::read_link(host)?.to_string_lossy().into_owned()
        } else {
            String::new()
        };
        let rdev = meta.rdev();
        Ok(FileStat {
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            linkname,
            uname: String::new(),
            gname: String::new(),
            devmajor: dev_major(rdev),
            devminor: dev_minor(rdev),
            xattrs: xattrs::read_all(host),
            inode: Some((meta.dev(), meta.ino())),
            nlink: meta.nlink(),
        })
    }
}

impl Filesystem for LocalFs {
    fn lstat(&self, path: &str) -> io::Result<FileStat> {
        self.stat_host(&self.host_path(path))
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.host_path(path))? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(self.host_path(path))?))
    }

    fn walk(
        &self,
        root: &str,
        visit: &mut dyn FnMut(&str, &FileStat) -> io::Result<()>,
    ) -> io::Result<()> {
        let walker = WalkDir::new(self.host_path(root))
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let stat = self.stat_host(entry.path())?;
            visit(&self.logical_path(entry.path()), &stat)?;
        }
        Ok(())
    }
}

/// Linux `major()` of a device number.
fn dev_major(rdev: u64) -> u64 {
    ((rdev >> 32) & 0xffff_f000) | ((rdev >> 8) & 0x0000_0fff)
}

/// Linux `minor()` of a device number.
fn dev_minor(rdev: u64) -> u64 {
    ((rdev >> 12) & 0xffff_ff00) | (rdev & 0x0000_00ff)
}

#[cfg(target_os = "linux")]
mod xattrs {
    use std::collections::BTreeMap;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    /// Extended attributes of `path` (not following symlinks). Filesystems
    /// without xattr support yield an empty map.
    pub fn read_all(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut out = BTreeMap::new();
        let c_path = match CString::new(path.as_os_str().as_bytes()) {
            Ok(p) => p,
            Err(_) => return out,
        };

        // SAFETY: c_path is NUL-terminated; a null buffer with size 0 asks
        // for the required length only.
        let len = unsafe { libc::llistxattr(c_path.as_ptr(), std::ptr::null_mut(), 0) };
        if len <= 0 {
            return out;
        }
        let mut names = vec![0u8; len as usize];
        // SAFETY: names has exactly `len` writable bytes.
        let len = unsafe {
            libc::llistxattr(
                c_path.as_ptr(),
                names.as_mut_ptr() as *mut libc::c_char,
                names.len(),
            )
        };
        if len <= 0 {
            return out;
        }
        names.truncate(len as usize);

        for raw in names.split(|&b| b == 0).filter(|n| !n.is_empty()) {
            let name = match CString::new(raw) {
                Ok(n) => n,
                Err(_) => continue,
            };
            if let Some(value) = get(&c_path, &name) {
                out.insert(String::from_utf8_lossy(raw).into_owned(), value);
            }
        }
        out
    }

    fn get(path: &CString, name: &CString) -> Option<Vec<u8>> {
        // SAFETY: both pointers are NUL-terminated C strings.
        let len =
            unsafe { libc::lgetxattr(path.as_ptr(), name.as_ptr(), std::ptr::null_mut(), 0) };
        if len < 0 {
            return None;
        }
        let mut value = vec![0u8; len as usize];
        if value.is_empty() {
            return Some(value);
        }
        // SAFETY: value has exactly `len` writable bytes.
        let len = unsafe {
            libc::lgetxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_mut_ptr() as *mut libc::c_void,
                value.len(),
            )
        };
        if len < 0 {
            return None;
        }
        value.truncate(len as usize);
        Some(value)
    }
}

#[cfg(not(target_os = "linux"))]
mod xattrs {
    use std::collections::BTreeMap;
    use std::path::Path;

    pub fn read_all(_path: &Path) -> BTreeMap<String, Vec<u8>> {
        BTreeMap::new()
    }
}

/// [`Ref`] over a host directory.
#[derive(Debug)]
pub struct DirRef {
    id: String,
    root: PathBuf,
    released: AtomicBool,
}

impl DirRef {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            released: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mountable for DirRef {
    async fn mount(
        &self,
        _readonly: bool,
        session: &SessionGroup,
    ) -> Result<Arc<dyn Filesystem>, ChecksumError> {
        if self.is_released() {
            return Err(ChecksumError::InvalidMount(format!(
                "ref {} has been released",
                self.id
            )));
        }
        let meta = fs::metadata(&self.root).map_err(|e| {
            ChecksumError::InvalidMount(format!("{}: {}", self.root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(ChecksumError::InvalidMount(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        debug!(ref_id = %self.id, sessions = session.ids().len(), "Mounted directory ref");
        Ok(Arc::new(LocalFs::new(self.root.clone())))
    }
}

#[async_trait]
impl Ref for DirRef {
    fn id(&self) -> &str {
        &self.id
    }

    async fn release(&self) -> Result<(), ChecksumError> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<Arc<dyn Ref>, ChecksumError> {
        Ok(Arc::new(DirRef::new(self.id.clone(), self.root.clone())))
    }
}

//! Path cleaning and index-key utilities
//!
//! All paths inside a content root are kept in one canonical form: rooted at
//! `/`, no trailing slash (except the root itself), no `.` or `..` segments and
//! no repeated separators. `..` never climbs above the root.
//!
//! Index keys replace every `/` with a NUL byte so that, under plain byte
//! ordering, a directory's entries sort directly after it and before any
//! sibling that merely shares its name as a prefix (`foo`, `foo/bar`, `foo-bar`).

/// Byte that stands in for `/` inside index keys.
pub const KEY_SEPARATOR: u8 = 0;

/// Lexically clean `path` into canonical rooted form.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Join a canonical directory with a single child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent of a canonical path; the root is its own parent.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Final component of a canonical path (empty for the root).
pub fn base(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Components of a path, skipping empty segments.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Every proper ancestor of a canonical path, nearest first, ending at `/`.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path;
    while current != "/" {
        current = parent(current);
        out.push(current);
    }
    out
}

/// True when `path` equals `root` or lies below it.
pub fn is_within(root: &str, path: &str) -> bool {
    if root == "/" || root == path {
        return true;
    }
    path.len() > root.len() && path.starts_with(root) && path.as_bytes()[root.len()] == b'/'
}

/// Path of `path` relative to `root`, without a leading slash.
///
/// Returns `None` when `path` is not within `root`; `Some("")` when equal.
pub fn relative<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    if !is_within(root, path) {
        return None;
    }
    if root == path {
        return Some("");
    }
    if root == "/" {
        return Some(&path[1..]);
    }
    Some(&path[root.len() + 1..])
}

/// Index key for a canonical path.
pub fn to_key(path: &str) -> Vec<u8> {
    path.bytes()
        .map(|b| if b == b'/' { KEY_SEPARATOR } else { b })
        .collect()
}

/// Inverse of [`to_key`].
pub fn from_key(key: &[u8]) -> String {
    let bytes: Vec<u8> = key
        .iter()
        .map(|&b| if b == KEY_SEPARATOR { b'/' } else { b })
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Key prefix shared by every descendant of `path`.
pub fn child_prefix(path: &str) -> Vec<u8> {
    if path == "/" {
        vec![KEY_SEPARATOR]
    } else {
        let mut key = to_key(path);
        key.push(KEY_SEPARATOR);
        key
    }
}

/// Sort key for a relative path (separator sorts before any other byte).
pub fn relative_key(rel: &str) -> Vec<u8> {
    rel.bytes()
        .map(|b| if b == b'/' { KEY_SEPARATOR } else { b })
        .collect()
}

//! Error types for content checksumming.

use std::io;
use thiserror::Error;

/// Durable store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Failed to encode cache snapshot: {0}")]
    Encode(String),

    #[error("Failed to decode cache snapshot: {0}")]
    Decode(String),

    #[error("Unsupported cache snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Errors surfaced by checksum queries, change streams and the cache manager.
///
/// The type is `Clone` because a single scan result is fanned out to every
/// caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum ChecksumError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Invalid mount: {0}")]
    InvalidMount(String),

    #[error("Malformed change for {path}: {reason}")]
    MalformedChange { path: String, reason: String },

    #[error("Too many levels of symbolic links resolving {0}")]
    CyclicSymlink(String),

    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Change stream halted: {0}")]
    StreamHalted(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error on {path}: {message}")]
    Io {
        path: String,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChecksumError {
    /// Map an I/O error for `path`, turning `ENOENT` into `NotFound`.
    pub fn io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ChecksumError::NotFound(path.to_string()),
            kind => ChecksumError::Io {
                path: path.to_string(),
                kind,
                message: err.to_string(),
            },
        }
    }

    pub fn malformed(path: &str, reason: impl Into<String>) -> Self {
        ChecksumError::MalformedChange {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ChecksumError::NotFound(_))
    }
}

impl From<config::ConfigError> for ChecksumError {
    fn from(err: config::ConfigError) -> Self {
        ChecksumError::Config(err.to_string())
    }
}

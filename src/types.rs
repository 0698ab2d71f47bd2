//! Core value types: digests and checksum options.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw 32-byte BLAKE3 output
pub type Hash = [u8; 32];

/// Algorithm tag carried by every externally visible digest.
pub const DIGEST_ALGORITHM: &str = "blake3";

/// A content digest in `algorithm:hex` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(String);

impl Digest {
    /// Wrap raw hash bytes produced by the BLAKE3 primitive.
    pub fn from_hash(hash: &Hash) -> Self {
        Digest(format!("{}:{}", DIGEST_ALGORITHM, hex::encode(hash)))
    }

    /// Digest of arbitrary bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_hash(blake3::hash(data).as_bytes())
    }

    /// Digest of the empty byte sequence.
    ///
    /// Returned for directories and filtered walks with nothing to compose.
    pub fn empty() -> Self {
        Self::from_bytes(&[])
    }

    /// Parse an `algorithm:hex` string, rejecting unknown algorithms.
    pub fn parse(s: &str) -> Option<Self> {
        let (algorithm, hex_part) = s.split_once(':')?;
        if algorithm != DIGEST_ALGORITHM || hex_part.len() != 64 {
            return None;
        }
        let mut raw = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut raw).ok()?;
        Some(Self::from_hash(&raw))
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or("")
    }

    pub fn hex(&self) -> &str {
        self.0.split_once(':').map(|(_, h)| h).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller options for a checksum query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumOpts {
    /// Resolve the final path component if it is a symlink.
    pub follow_links: bool,
    /// Treat path components as glob patterns.
    pub wildcard: bool,
    /// Only hash entries matching one of these patterns (empty = everything).
    pub include_patterns: Vec<String>,
    /// Drop entries matching these patterns (applied after includes).
    pub exclude_patterns: Vec<String>,
}

impl ChecksumOpts {
    pub fn follow() -> Self {
        Self {
            follow_links: true,
            ..Self::default()
        }
    }

    pub fn has_filters(&self) -> bool {
        !self.include_patterns.is_empty() || !self.exclude_patterns.is_empty()
    }
}

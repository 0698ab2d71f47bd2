//! Hashed-stat tree
//!
//! Per-entry digests, the ordered path index that holds them, directory
//! composition, scanning and symlink resolution.

pub mod hasher;
pub mod index;
pub mod node;
pub mod path;
pub mod resolver;
pub mod walker;

//! Property-based tests for digest stability

mod determinism;
mod encoding;

//! Glob matching for wildcard queries and include/exclude walks
//!
//! Include/exclude patterns behave like ignore files: a pattern matches a path
//! when it matches the path itself or any ancestor of it, patterns are
//! evaluated in order with the last match winning, and a leading `!` turns a
//! pattern into an exception. `*`, `?` and `[...]` never cross a `/`; `**`
//! spans any number of segments, and `dir/**` also matches `dir` itself.

use crate::error::ChecksumError;
use crate::tree::path;
use globset::{GlobBuilder, GlobMatcher};

const META_CHARS: &[char] = &['*', '?', '['];

/// Whether `s` contains glob metacharacters.
pub fn has_meta(s: &str) -> bool {
    s.contains(META_CHARS)
}

fn build_glob(pattern: &str, original: &str) -> Result<GlobMatcher, ChecksumError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| ChecksumError::InvalidPattern {
            pattern: original.to_string(),
            reason: e.to_string(),
        })
}

/// Matcher for a single path component (wildcard queries).
pub fn component_matcher(component: &str) -> Result<GlobMatcher, ChecksumError> {
    build_glob(component, component)
}

/// Strip leading `/` or `./`, trailing `/`, and lexically clean.
///
/// A pattern that cleans down to nothing selects everything.
pub fn normalize(pattern: &str) -> String {
    let cleaned = path::clean(pattern);
    let rel = cleaned.trim_start_matches('/');
    if rel.is_empty() {
        "**".to_string()
    } else {
        rel.to_string()
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    negated: bool,
    matchers: Vec<GlobMatcher>,
}

impl CompiledPattern {
    fn compile(raw: &str) -> Result<Self, ChecksumError> {
        let (negated, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        if body.trim().is_empty() && negated {
            return Err(ChecksumError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "exception without a pattern".to_string(),
            });
        }

        let normalized = normalize(body);
        let mut matchers = vec![build_glob(&normalized, raw)?];
        if let Some(dir) = normalized.strip_suffix("/**") {
            if !dir.is_empty() {
                matchers.push(build_glob(dir, raw)?);
            }
        }
        Ok(Self {
            source: raw.to_string(),
            negated,
            matchers,
        })
    }

    fn matches_exact(&self, rel: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(rel))
    }

    /// Matches `rel` or one of its ancestors.
    fn matches(&self, rel: &str) -> bool {
        if self.matches_exact(rel) {
            return true;
        }
        let mut current = rel;
        while let Some(idx) = current.rfind('/') {
            current = &current[..idx];
            if self.matches_exact(current) {
                return true;
            }
        }
        false
    }
}

/// Ordered list of patterns with last-match-wins evaluation
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    patterns: Vec<CompiledPattern>,
}

impl PatternMatcher {
    pub fn new(patterns: &[String]) -> Result<Self, ChecksumError> {
        let patterns = patterns
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.source.as_str())
    }

    /// `Some(true)` when the last matching pattern is a plain pattern,
    /// `Some(false)` when it is an exception, `None` when nothing matched.
    pub fn evaluate(&self, rel: &str) -> Option<bool> {
        let mut verdict = None;
        for pattern in &self.patterns {
            if pattern.matches(rel) {
                verdict = Some(!pattern.negated);
            }
        }
        verdict
    }

    pub fn matches(&self, rel: &str) -> bool {
        self.evaluate(rel) == Some(true)
    }
}

/// Include and exclude lists applied together; excludes run after includes.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: PatternMatcher,
    exclude: PatternMatcher,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ChecksumError> {
        Ok(Self {
            include: PatternMatcher::new(include)?,
            exclude: PatternMatcher::new(exclude)?,
        })
    }

    /// Whether the walk entry at relative path `rel` is selected.
    pub fn selects(&self, rel: &str) -> bool {
        let included = self.include.is_empty() || self.include.matches(rel);
        included && !self.exclude.matches(rel)
    }
}

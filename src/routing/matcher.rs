//! Path pattern matching.
//!
//! # Responsibilities
//! - Parse `exact` and `prefix*` path patterns
//! - Keep an ordered (pattern, value) table evaluated longest-match-first
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching in the pattern count
//! - At equal length an exact pattern beats a wildcard one

use std::fmt;

/// A path pattern: a literal path, or a literal prefix ending in `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    /// Parse a pattern. A single trailing `*` marks a prefix match.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix('*') {
            Some(prefix) => PathPattern::Prefix(prefix.to_string()),
            None => PathPattern::Exact(raw.to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => path == p,
            PathPattern::Prefix(p) => path.starts_with(p.as_str()),
        }
    }

    /// Literal part of the pattern.
    pub fn literal(&self) -> &str {
        match self {
            PathPattern::Exact(p) | PathPattern::Prefix(p) => p,
        }
    }

    fn is_exact(&self) -> bool {
        matches!(self, PathPattern::Exact(_))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Exact(p) => f.write_str(p),
            PathPattern::Prefix(p) => write!(f, "{p}*"),
        }
    }
}

/// Ordered table of patterns, most specific first.
#[derive(Debug, Clone)]
pub struct PatternTable<T> {
    entries: Vec<(PathPattern, T)>,
}

impl<T> Default for PatternTable<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> PatternTable<T> {
    pub fn new(entries: impl IntoIterator<Item = (PathPattern, T)>) -> Self {
        let mut entries: Vec<(PathPattern, T)> = entries.into_iter().collect();
        // Stable sort keeps configuration order for identical patterns.
        entries.sort_by(|(a, _), (b, _)| {
            b.literal()
                .len()
                .cmp(&a.literal().len())
                .then_with(|| b.is_exact().cmp(&a.is_exact()))
        });
        Self { entries }
    }

    /// First (longest) entry whose pattern matches `path`.
    pub fn lookup(&self, path: &str) -> Option<(&PathPattern, &T)> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(pattern, value)| (pattern, value))
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PatternTable<()> {
    /// Build a membership-only table from raw pattern strings.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self::new(patterns.iter().map(|p| (PathPattern::parse(p.as_ref()), ())))
    }
}

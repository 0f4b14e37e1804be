//! # Reference Paths
//!
//! Slash-delimited addresses into the store's hierarchical data tree.
//! Paths are validated at construction so every other layer can assume
//! they are well-formed.

use std::fmt;

use super::errors::{StoreError, StoreResult};

/// A validated reference path into the data tree
///
/// Invariants: non-empty, no empty segments, no leading or trailing
/// slash after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreePath {
    raw: String,
}

impl TreePath {
    /// Parse and normalize a path string
    ///
    /// Leading and trailing slashes are stripped; an empty result or an
    /// empty segment (`a//b`) is rejected.
    pub fn parse(path: &str) -> StoreResult<Self> {
        let trimmed = path.trim_matches('/');

        if trimmed.is_empty() {
            return Err(StoreError::InvalidPath("empty path".to_string()));
        }

        if trimmed.split('/').any(|segment| segment.is_empty()) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        Ok(Self {
            raw: trimmed.to_string(),
        })
    }

    /// Append a child segment
    ///
    /// The child must be a single non-empty segment (no slashes).
    pub fn join(&self, child: &str) -> StoreResult<Self> {
        if child.is_empty() || child.contains('/') {
            return Err(StoreError::InvalidPath(format!(
                "invalid child segment: {:?}",
                child
            )));
        }

        Ok(Self {
            raw: format!("{}/{}", self.raw, child),
        })
    }

    /// Path segments, outermost first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw.split('/')
    }

    /// The path as a normalized string
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_slashes() {
        let path = TreePath::parse("/sample_content/").unwrap();
        assert_eq!(path.as_str(), "sample_content");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(TreePath::parse("").is_err());
        assert!(TreePath::parse("///").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        assert!(TreePath::parse("a//b").is_err());
    }

    #[test]
    fn test_join() {
        let path = TreePath::parse("sample_content").unwrap();
        let child = path.join("id1").unwrap();
        assert_eq!(child.as_str(), "sample_content/id1");
    }

    #[test]
    fn test_join_rejects_nested_segment() {
        let path = TreePath::parse("a").unwrap();
        assert!(path.join("b/c").is_err());
        assert!(path.join("").is_err());
    }

    #[test]
    fn test_segments() {
        let path = TreePath::parse("a/b/c").unwrap();
        let segments: Vec<_> = path.segments().collect();
        assert_eq!(segments, vec!["a", "b", "c"]);
    }
}

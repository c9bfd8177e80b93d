//! Resolved content values
//!
//! The content-retrieval collaborator resolves inline values, file paths and
//! bucket paths to their canonical text form before this engine sees them.
//! [`ResolvedContent`] is that canonical form plus its identity hash.

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Fully-resolved sub-resource content
///
/// Two sources with identical canonical content produce identical hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedContent(String);

impl ResolvedContent {
    /// Wrap already-resolved content
    #[inline]
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    /// Get the content as a string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the content is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SHA-256 identity of this content
    #[inline]
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        ContentHash::compute(self.0.as_bytes())
    }
}

impl From<&str> for ResolvedContent {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResolvedContent {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_same_hash() {
        let a = ResolvedContent::new("knowledge base v1");
        let b = ResolvedContent::new(String::from("knowledge base v1"));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn different_content_different_hash() {
        let a = ResolvedContent::new("v1");
        let b = ResolvedContent::new("v2");
        assert_ne!(a.hash(), b.hash());
    }
}

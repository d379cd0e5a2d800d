//! Extracted candidate code.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the response digest.
const RESPONSE_ID_LEN: usize = 16;

/// Candidate source pulled out of a single model response.
///
/// Immutable once created. `response_id` ties the artifact back to the
/// response it came from so transcripts can be correlated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    source: String,
    response_id: String,
    language: Option<String>,
}

impl CodeArtifact {
    /// Wraps raw source that did not come from a fenced response.
    ///
    /// The response id is derived from the source itself.
    pub fn from_source(source: impl Into<String>) -> Self {
        let source = source.into();
        let response_id = response_id(&source);
        Self {
            source,
            response_id,
            language: None,
        }
    }

    pub(crate) fn new(source: String, response_id: String, language: Option<String>) -> Self {
        Self {
            source,
            response_id,
            language,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    /// Fence language tag, if the block declared one.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Trimmed text of 1-based line `n`.
    pub fn line(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return None;
        }
        self.source.lines().nth(n - 1).map(str::trim)
    }

    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }
}

/// Short content hash identifying a response.
pub fn response_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(RESPONSE_ID_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_lookup() {
        let artifact = CodeArtifact::from_source("x = 1\n    y = x + 1\nprint(y)");
        assert_eq!(artifact.line(1), Some("x = 1"));
        assert_eq!(artifact.line(2), Some("y = x + 1"));
        assert_eq!(artifact.line(3), Some("print(y)"));
        assert_eq!(artifact.line(0), None);
        assert_eq!(artifact.line(4), None);
        assert_eq!(artifact.line_count(), 3);
    }

    #[test]
    fn test_response_id_is_stable() {
        let a = response_id("same text");
        let b = response_id("same text");
        let c = response_id("other text");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), RESPONSE_ID_LEN);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}

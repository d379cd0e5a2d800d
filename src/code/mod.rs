//! Candidate code and its extraction from model responses.

pub mod artifact;
pub mod extractor;

pub use artifact::CodeArtifact;
pub use extractor::extract;

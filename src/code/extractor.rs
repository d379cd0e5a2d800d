//! Fenced code block extraction from model responses.
//!
//! A response must contain exactly one fenced section: an opening line of
//! three backticks with an optional language tag, and a closing line of three
//! backticks. Anything else is an [`ExecutionFault::ExtractionFailure`].

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::artifact::{response_id, CodeArtifact};
use crate::fault::ExecutionFault;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[ \t]*([A-Za-z0-9_+.-]*)[ \t]*\r?\n(.*?)^[ \t]*```[ \t]*\r?$")
        .expect("Invalid regex for fenced code blocks")
});

/// Extracts the single fenced code block from `response`.
///
/// The block content is returned verbatim, minus the line break that
/// precedes the closing fence.
pub fn extract(response: &str) -> Result<CodeArtifact, ExecutionFault> {
    let blocks: Vec<_> = FENCED_BLOCK.captures_iter(response).collect();
    if blocks.len() != 1 {
        debug!(blocks_found = blocks.len(), "Response rejected by extractor");
        return Err(ExecutionFault::ExtractionFailure {
            blocks_found: blocks.len(),
        });
    }

    let captures = &blocks[0];
    let language = captures
        .get(1)
        .map(|m| m.as_str())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string);
    let body = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    let body = body
        .strip_suffix('\n')
        .map(|b| b.strip_suffix('\r').unwrap_or(b))
        .unwrap_or(body);

    Ok(CodeArtifact::new(
        body.to_string(),
        response_id(response),
        language,
    ))
}

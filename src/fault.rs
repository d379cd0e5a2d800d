//! Classified outcomes of a single round.
//!
//! Every way a round can fail to yield a valid artifact is an
//! [`ExecutionFault`] variant. Faults are ordinary values: the executor and
//! validator return them, and the debug loop branches on them to choose the
//! corrective message. A round reports at most one fault, the first one hit.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A 1-based line of candidate source and its literal (trimmed) text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub text: String,
}

impl SourceLocation {
    pub fn new(line: usize, text: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
        }
    }
}

/// Why a round did not produce a valid artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ExecutionFault {
    /// The response held zero or several fenced code blocks.
    ExtractionFailure { blocks_found: usize },

    /// The code imported a forbidden or unavailable module.
    ForbiddenImport {
        module: String,
        message: String,
        location: Option<SourceLocation>,
    },

    /// The code called a guarded builtin.
    ForbiddenCall {
        symbol: String,
        location: Option<SourceLocation>,
    },

    /// The code opened a file for writing that the policy does not allow.
    ForbiddenWrite {
        path: String,
        location: Option<SourceLocation>,
    },

    /// The code opened a file for reading that the policy does not allow.
    ForbiddenRead {
        path: String,
        location: Option<SourceLocation>,
    },

    /// The run left files behind that match no allowed creation pattern.
    UnexpectedFilesCreated { paths: Vec<String> },

    /// Any other uncaught exception, including syntax errors.
    RuntimeFault {
        exception: String,
        message: String,
        location: Option<SourceLocation>,
    },

    /// The run exceeded its wall-clock budget and was killed.
    Timeout {
        seconds: f64,
        location: Option<SourceLocation>,
    },

    /// A warning of a kind the policy treats as fatal.
    FatalWarning {
        kind: String,
        message: String,
        location: Option<SourceLocation>,
    },

    /// A required output file was not produced.
    OutputMissing { requirement: String, target: String },

    /// A required output file exists but does not parse.
    OutputMalformed { requirement: String, reason: String },
}

/// Fault category without payload, used for labels and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    ExtractionFailure,
    ForbiddenImport,
    ForbiddenCall,
    ForbiddenWrite,
    ForbiddenRead,
    UnexpectedFilesCreated,
    RuntimeFault,
    Timeout,
    FatalWarning,
    OutputMissing,
    OutputMalformed,
}

impl FaultCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCategory::ExtractionFailure => "extraction_failure",
            FaultCategory::ForbiddenImport => "forbidden_import",
            FaultCategory::ForbiddenCall => "forbidden_call",
            FaultCategory::ForbiddenWrite => "forbidden_write",
            FaultCategory::ForbiddenRead => "forbidden_read",
            FaultCategory::UnexpectedFilesCreated => "unexpected_files_created",
            FaultCategory::RuntimeFault => "runtime_fault",
            FaultCategory::Timeout => "timeout",
            FaultCategory::FatalWarning => "fatal_warning",
            FaultCategory::OutputMissing => "output_missing",
            FaultCategory::OutputMalformed => "output_malformed",
        }
    }
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExecutionFault {
    pub fn category(&self) -> FaultCategory {
        match self {
            ExecutionFault::ExtractionFailure { .. } => FaultCategory::ExtractionFailure,
            ExecutionFault::ForbiddenImport { .. } => FaultCategory::ForbiddenImport,
            ExecutionFault::ForbiddenCall { .. } => FaultCategory::ForbiddenCall,
            ExecutionFault::ForbiddenWrite { .. } => FaultCategory::ForbiddenWrite,
            ExecutionFault::ForbiddenRead { .. } => FaultCategory::ForbiddenRead,
            ExecutionFault::UnexpectedFilesCreated { .. } => FaultCategory::UnexpectedFilesCreated,
            ExecutionFault::RuntimeFault { .. } => FaultCategory::RuntimeFault,
            ExecutionFault::Timeout { .. } => FaultCategory::Timeout,
            ExecutionFault::FatalWarning { .. } => FaultCategory::FatalWarning,
            ExecutionFault::OutputMissing { .. } => FaultCategory::OutputMissing,
            ExecutionFault::OutputMalformed { .. } => FaultCategory::OutputMalformed,
        }
    }

    /// Candidate source location the fault points at, if it has one.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            ExecutionFault::ForbiddenImport { location, .. }
            | ExecutionFault::ForbiddenCall { location, .. }
            | ExecutionFault::ForbiddenWrite { location, .. }
            | ExecutionFault::ForbiddenRead { location, .. }
            | ExecutionFault::RuntimeFault { location, .. }
            | ExecutionFault::Timeout { location, .. }
            | ExecutionFault::FatalWarning { location, .. } => location.as_ref(),
            _ => None,
        }
    }

    pub fn line(&self) -> Option<usize> {
        self.location().map(|l| l.line)
    }

    /// One-line message in the style of an interpreter error.
    pub fn message(&self) -> String {
        match self {
            ExecutionFault::ExtractionFailure { blocks_found } => format!(
                "ExtractionFailure: expected exactly one code block, found {}",
                blocks_found
            ),
            ExecutionFault::ForbiddenImport { message, .. } => format!("ImportError: {}", message),
            ExecutionFault::ForbiddenCall { symbol, .. } => format!(
                "CodeUsesForbiddenFunctions: Code uses a forbidden function: `{}`",
                symbol
            ),
            ExecutionFault::ForbiddenWrite { path, .. } => format!(
                "CodeWriteForbiddenFile: Code writes to a forbidden file: `{}`",
                path
            ),
            ExecutionFault::ForbiddenRead { path, .. } => format!(
                "CodeReadForbiddenFile: Code reads from a forbidden file: `{}`",
                path
            ),
            ExecutionFault::UnexpectedFilesCreated { paths } => format!(
                "UnAllowedFilesCreated: Code created files that are not allowed: {}",
                paths.join(", ")
            ),
            ExecutionFault::RuntimeFault {
                exception, message, ..
            } => {
                if message.is_empty() {
                    exception.clone()
                } else {
                    format!("{}: {}", exception, message)
                }
            }
            ExecutionFault::Timeout { seconds, .. } => format!(
                "TimeoutError: Code timeout after {} seconds",
                format_seconds(*seconds)
            ),
            ExecutionFault::FatalWarning { kind, message, .. } => {
                format!("{}: {}", kind, message)
            }
            ExecutionFault::OutputMissing { target, .. } => format!(
                "OutputMissing: the code did not create the output file `{}`",
                target
            ),
            ExecutionFault::OutputMalformed {
                requirement,
                reason,
            } => format!(
                "OutputMalformed: output `{}` could not be parsed: {}",
                requirement, reason
            ),
        }
    }

    /// Message prefixed with the offending line, for humans and for
    /// corrective prompts.
    pub fn describe(&self) -> String {
        match self.location() {
            Some(location) => format!(
                "On line {}:\n{}\n{}",
                location.line,
                location.text,
                self.message()
            ),
            None => self.message(),
        }
    }
}

impl fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as u64)
    } else {
        format!("{}", seconds)
    }
}

/// Kind of a non-fatal observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Print,
    Warning,
}

/// A non-fatal observation made during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIssue {
    pub kind: IssueKind,
    pub message: String,
    #[serde(default)]
    pub line: Option<usize>,
}

/// Parsed content of one output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    Text { text: String },
    Table { header: Vec<String>, rows: Vec<Vec<String>> },
    Json { value: serde_json::Value },
}

impl OutputContent {
    /// Returns the text for plain text outputs.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutputContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One file retained for a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    /// Path relative to the working directory.
    pub path: String,
    pub content: OutputContent,
}

/// Everything a successful round produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFiles {
    /// Output files keyed by requirement id.
    pub outputs: BTreeMap<String, Vec<OutputFile>>,
    /// Files created by the run (relative paths).
    pub created_files: Vec<String>,
    /// Non-fatal issues observed during the run.
    pub issues: Vec<RunIssue>,
}

impl ArtifactFiles {
    /// Content of the only output file, when exactly one was retained.
    pub fn single_output(&self) -> Option<&OutputContent> {
        let mut files = self.outputs.values().flatten();
        match (files.next(), files.next()) {
            (Some(file), None) => Some(&file.content),
            _ => None,
        }
    }

    /// Files retained for requirement `id`.
    pub fn output(&self, id: &str) -> Option<&[OutputFile]> {
        self.outputs.get(id).map(Vec::as_slice)
    }
}

/// Outcome of a round: the artifact, or the first fault encountered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success(ArtifactFiles),
    Failure(ExecutionFault),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn fault(&self) -> Option<&ExecutionFault> {
        match self {
            ExecutionResult::Failure(fault) => Some(fault),
            ExecutionResult::Success(_) => None,
        }
    }

    pub fn artifacts(&self) -> Option<&ArtifactFiles> {
        match self {
            ExecutionResult::Success(files) => Some(files),
            ExecutionResult::Failure(_) => None,
        }
    }
}

//! Translation of the harness report into typed faults.

use std::path::Path;

use serde::Deserialize;

use crate::code::CodeArtifact;
use crate::fault::{ExecutionFault, RunIssue, SourceLocation};

/// Raw report written by the harness.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessReport {
    #[serde(default)]
    pub fault: Option<HarnessFault>,
    #[serde(default)]
    pub issues: Vec<RunIssue>,
}

/// Fault as the harness describes it, before line text is attached.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HarnessFault {
    ForbiddenImport {
        module: String,
        message: String,
        line: Option<usize>,
    },
    ImportError {
        module: String,
        message: String,
        line: Option<usize>,
    },
    ForbiddenCall {
        symbol: String,
        line: Option<usize>,
    },
    ForbiddenWrite {
        path: String,
        line: Option<usize>,
    },
    ForbiddenRead {
        path: String,
        line: Option<usize>,
    },
    FatalWarning {
        warning: String,
        message: String,
        line: Option<usize>,
    },
    Exception {
        exception: String,
        message: String,
        line: Option<usize>,
    },
}

impl HarnessReport {
    /// Reads and parses a report file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Location for `line` with its literal text from the artifact.
pub fn locate(artifact: &CodeArtifact, line: Option<usize>) -> Option<SourceLocation> {
    line.filter(|n| *n > 0).map(|n| {
        SourceLocation::new(n, artifact.line(n).unwrap_or_default())
    })
}

impl HarnessFault {
    /// Converts to an [`ExecutionFault`], attaching source text.
    pub fn into_fault(self, artifact: &CodeArtifact) -> ExecutionFault {
        match self {
            HarnessFault::ForbiddenImport {
                module,
                message,
                line,
            } => ExecutionFault::ForbiddenImport {
                module,
                message,
                location: locate(artifact, line),
            },
            HarnessFault::ImportError {
                module,
                message,
                line,
            } => ExecutionFault::ForbiddenImport {
                module,
                message,
                location: locate(artifact, line),
            },
            HarnessFault::ForbiddenCall { symbol, line } => ExecutionFault::ForbiddenCall {
                symbol,
                location: locate(artifact, line),
            },
            HarnessFault::ForbiddenWrite { path, line } => ExecutionFault::ForbiddenWrite {
                path,
                location: locate(artifact, line),
            },
            HarnessFault::ForbiddenRead { path, line } => ExecutionFault::ForbiddenRead {
                path,
                location: locate(artifact, line),
            },
            HarnessFault::FatalWarning {
                warning,
                message,
                line,
            } => ExecutionFault::FatalWarning {
                kind: warning,
                message,
                location: locate(artifact, line),
            },
            HarnessFault::Exception {
                exception,
                message,
                line,
            } => ExecutionFault::RuntimeFault {
                exception,
                message,
                location: locate(artifact, line),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::IssueKind;

    fn artifact() -> CodeArtifact {
        CodeArtifact::from_source("a = 1\ninput()\n")
    }

    #[test]
    fn test_parse_forbidden_call_report() {
        let json = r#"{
            "fault": {"kind": "forbidden_call", "symbol": "input", "line": 2},
            "issues": [{"kind": "print", "message": "Code uses the `print` function", "line": 1}]
        }"#;
        let report: HarnessReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::Print);

        let fault = report.fault.unwrap().into_fault(&artifact());
        assert_eq!(
            fault,
            ExecutionFault::ForbiddenCall {
                symbol: "input".to_string(),
                location: Some(SourceLocation::new(2, "input()")),
            }
        );
    }

    #[test]
    fn test_import_error_maps_to_forbidden_import() {
        let json = r#"{"fault": {"kind": "import_error", "module": "xxx",
            "message": "No module named 'xxx'", "line": 1}}"#;
        let report: HarnessReport = serde_json::from_str(json).unwrap();
        let fault = report.fault.unwrap().into_fault(&artifact());
        match fault {
            ExecutionFault::ForbiddenImport {
                module,
                message,
                location,
            } => {
                assert_eq!(module, "xxx");
                assert!(message.contains("No module named"));
                assert_eq!(location.map(|l| l.line), Some(1));
            }
            other => panic!("unexpected fault: {:?}", other),
        }
    }

    #[test]
    fn test_clean_report() {
        let report: HarnessReport = serde_json::from_str(r#"{"fault": null, "issues": []}"#).unwrap();
        assert!(report.fault.is_none());
    }

    #[test]
    fn test_missing_line() {
        let json = r#"{"fault": {"kind": "exception", "exception": "MemoryError",
            "message": "", "line": null}}"#;
        let report: HarnessReport = serde_json::from_str(json).unwrap();
        let fault = report.fault.unwrap().into_fault(&artifact());
        assert!(fault.location().is_none());
        assert_eq!(fault.message(), "MemoryError");
    }
}

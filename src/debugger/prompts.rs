//! Corrective messages sent back to the model after a failed round.

use crate::fault::ExecutionFault;

/// Message asking for a rewrite that only uses `packages`.
///
/// Falls back to [`error_message`] when no package list is configured.
pub fn permitted_packages_message(fault: &ExecutionFault, packages: &[String]) -> String {
    if packages.is_empty() {
        return error_message(fault);
    }
    format!(
        "I ran the code and got the following error message:\n```\n{}\n```\n\
         Please rewrite the code using only {}.",
        fault.describe(),
        packages.join(", ")
    )
}

/// Message quoting the fault and asking for a complete corrected rewrite.
pub fn error_message(fault: &ExecutionFault) -> String {
    format!(
        "I ran the code and got the following error message:\n```\n{}\n```\n\
         Please rewrite the complete code again with this error corrected.",
        fault.describe()
    )
}

/// Message naming an output file the code did not create.
pub fn missing_output_message(target: &str) -> String {
    format!(
        "I ran the code, but it didn't generate the desired output file ({}).\n\
         Please rewrite the complete code again with this error corrected.",
        target
    )
}

/// Picks the corrective message for `fault`.
///
/// Returns `None` for extraction failures, which are handled by discarding
/// the response instead of replying to it.
pub fn corrective_message(fault: &ExecutionFault, packages: &[String]) -> Option<String> {
    match fault {
        ExecutionFault::ExtractionFailure { .. } => None,
        ExecutionFault::ForbiddenImport { .. } => Some(permitted_packages_message(fault, packages)),
        ExecutionFault::OutputMissing { target, .. } => Some(missing_output_message(target)),
        _ => Some(error_message(fault)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::SourceLocation;

    fn import_fault() -> ExecutionFault {
        ExecutionFault::ForbiddenImport {
            module: "os".to_string(),
            message: "Importing `os` is not allowed".to_string(),
            location: Some(SourceLocation::new(1, "import os")),
        }
    }

    #[test]
    fn test_permitted_packages_message() {
        let packages = vec!["pandas".to_string(), "numpy".to_string()];
        let message = corrective_message(&import_fault(), &packages).unwrap();
        assert!(message.contains("import os"));
        assert!(message.ends_with("Please rewrite the code using only pandas, numpy."));
    }

    #[test]
    fn test_import_without_packages_uses_error_message() {
        let message = corrective_message(&import_fault(), &[]).unwrap();
        assert!(message.contains("with this error corrected"));
    }

    #[test]
    fn test_runtime_fault_message_quotes_line() {
        let fault = ExecutionFault::RuntimeFault {
            exception: "SyntaxError".to_string(),
            message: "'(' was never closed".to_string(),
            location: Some(SourceLocation::new(2, "f.write((1)")),
        };
        let message = corrective_message(&fault, &[]).unwrap();
        assert!(message.contains("On line 2:\nf.write((1)\nSyntaxError: '(' was never closed"));
    }

    #[test]
    fn test_missing_output_message() {
        let fault = ExecutionFault::OutputMissing {
            requirement: "answer".to_string(),
            target: "out.txt".to_string(),
        };
        let message = corrective_message(&fault, &[]).unwrap();
        assert!(message.contains("didn't generate the desired output file (out.txt)"));
    }

    #[test]
    fn test_extraction_failure_has_no_message() {
        let fault = ExecutionFault::ExtractionFailure { blocks_found: 0 };
        assert!(corrective_message(&fault, &[]).is_none());
    }
}

//! Post-run validation of declared outputs.
//!
//! Runs only after a clean execution. Requirements are checked in order and
//! the first failure is returned as the round's fault.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::requirement::{ContentKind, OutputRequirement};
use crate::fault::{ArtifactFiles, ExecutionFault, ExecutionResult, OutputContent, OutputFile};
use crate::sandbox::RunReport;

/// Checks every requirement against `work_dir`.
///
/// Returns the retained content keyed by requirement id.
pub fn validate(
    work_dir: &Path,
    requirements: &[OutputRequirement],
) -> Result<BTreeMap<String, Vec<OutputFile>>, ExecutionFault> {
    let mut outputs = BTreeMap::new();

    for requirement in requirements {
        let files = resolve(work_dir, requirement);
        if files.is_empty() {
            return Err(ExecutionFault::OutputMissing {
                requirement: requirement.id.clone(),
                target: requirement.target.clone(),
            });
        }

        let mut retained = Vec::with_capacity(files.len());
        for relative in files {
            let content = read_content(&work_dir.join(&relative), &requirement.kind).map_err(
                |reason| ExecutionFault::OutputMalformed {
                    requirement: requirement.id.clone(),
                    reason: format!("{}: {}", relative, reason),
                },
            )?;
            retained.push(OutputFile {
                path: relative,
                content,
            });
        }

        debug!(
            requirement = %requirement.id,
            files = retained.len(),
            "Output requirement satisfied"
        );
        outputs.insert(requirement.id.clone(), retained);
    }

    Ok(outputs)
}

/// Turns a run report into the round's result.
///
/// A faulted run is returned as-is; a clean run is validated against
/// `requirements`.
pub fn conclude(
    report: RunReport,
    work_dir: &Path,
    requirements: &[OutputRequirement],
) -> ExecutionResult {
    if let Some(fault) = report.fault {
        return ExecutionResult::Failure(fault);
    }

    match validate(work_dir, requirements) {
        Ok(outputs) => ExecutionResult::Success(ArtifactFiles {
            outputs,
            created_files: report.created_files,
            issues: report.issues,
        }),
        Err(fault) => ExecutionResult::Failure(fault),
    }
}

/// Relative paths of existing files matching the requirement's target.
fn resolve(work_dir: &Path, requirement: &OutputRequirement) -> Vec<String> {
    if !requirement.is_pattern() {
        return if work_dir.join(&requirement.target).is_file() {
            vec![requirement.target.clone()]
        } else {
            Vec::new()
        };
    }

    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&work_dir.to_string_lossy()),
        requirement.target
    );
    let Ok(entries) = glob::glob(&pattern) else {
        return Vec::new();
    };

    let mut matches: Vec<String> = entries
        .flatten()
        .filter(|path| path.is_file())
        .filter_map(|path| relative_to(work_dir, path))
        .collect();
    matches.sort();
    matches
}

fn relative_to(root: &Path, path: PathBuf) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

fn read_content(path: &Path, kind: &ContentKind) -> Result<OutputContent, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let text = String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())?;

    match kind {
        ContentKind::Text => {
            if text.trim().is_empty() {
                Err("file is empty".to_string())
            } else {
                Ok(OutputContent::Text { text })
            }
        }
        ContentKind::Table { delimiter } => {
            let (header, rows) = parse_table(&text, *delimiter)?;
            Ok(OutputContent::Table { header, rows })
        }
        ContentKind::Json => serde_json::from_str(&text)
            .map(|value| OutputContent::Json { value })
            .map_err(|e| format!("invalid JSON: {}", e)),
    }
}

/// Parses delimited text with optional double-quoted fields.
///
/// The first record is the header; every later record must have the same
/// number of fields.
pub fn parse_table(text: &str, delimiter: char) -> Result<(Vec<String>, Vec<Vec<String>>), String> {
    let records = split_records(text, delimiter)?;
    let mut records = records.into_iter();
    let header = records
        .next()
        .filter(|h| h.iter().any(|f| !f.is_empty()))
        .ok_or_else(|| "table has no header".to_string())?;

    let mut rows = Vec::new();
    for (index, record) in records.enumerate() {
        if record.len() != header.len() {
            return Err(format!(
                "row {} has {} fields, expected {}",
                index + 2,
                record.len(),
                header.len()
            ));
        }
        rows.push(record);
    }

    Ok((header, rows))
}

fn split_records(text: &str, delimiter: char) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() => {
                in_quotes = true;
                field_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                field_started = false;
            }
            c if c == delimiter => {
                record.push(std::mem::take(&mut field));
                field_started = true;
            }
            _ => {
                field.push(ch);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if field_started || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    // Blank lines carry no data.
    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    Ok(records)
}

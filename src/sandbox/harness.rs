//! Control file handed to the Python mediation harness.
//!
//! The harness script itself lives next to this file as `harness.py` and is
//! compiled into the binary. Each round writes the script, the candidate and a
//! [`HarnessControl`] JSON document into a private control directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::policy::{FileAllowance, Policy};

/// Source of the mediation harness.
pub const HARNESS_SOURCE: &str = include_str!("harness.py");

/// File names used inside the control directory.
pub const HARNESS_FILE: &str = "harness.py";
pub const CANDIDATE_FILE: &str = "candidate.py";
pub const CONTROL_FILE: &str = "control.json";
pub const REPORT_FILE: &str = "report.json";
pub const POSITION_FILE: &str = "position";

/// How often the harness samples the candidate's current line.
pub const SAMPLE_INTERVAL_SECS: f64 = 0.05;

/// Everything the harness needs to enforce a [`Policy`].
#[derive(Debug, Clone, Serialize)]
pub struct HarnessControl {
    pub candidate_path: PathBuf,
    pub report_path: PathBuf,
    pub position_path: PathBuf,
    pub work_dir: PathBuf,
    /// Directories the interpreter may always write to (private HOME/TMPDIR).
    pub private_dirs: Vec<PathBuf>,
    pub forbidden_imports: Vec<String>,
    pub forbidden_calls: Vec<String>,
    /// `None` allows every file.
    pub allowed_write_files: Option<Vec<String>>,
    /// `None` allows every file.
    pub allowed_read_files: Option<Vec<String>>,
    pub fatal_warnings: Vec<String>,
    pub sample_interval: f64,
}

impl HarnessControl {
    /// Builds the control document for one round.
    pub fn new(
        policy: &Policy,
        control_dir: &Path,
        work_dir: &Path,
        private_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            candidate_path: control_dir.join(CANDIDATE_FILE),
            report_path: control_dir.join(REPORT_FILE),
            position_path: control_dir.join(POSITION_FILE),
            work_dir: work_dir.to_path_buf(),
            private_dirs,
            forbidden_imports: policy.forbidden_imports.iter().cloned().collect(),
            forbidden_calls: policy.forbidden_calls.iter().cloned().collect(),
            allowed_write_files: allowance_list(&policy.allowed_open_write_files),
            allowed_read_files: allowance_list(&policy.allowed_read_files),
            fatal_warnings: policy.fatal_warning_kinds.iter().cloned().collect(),
            sample_interval: SAMPLE_INTERVAL_SECS,
        }
    }
}

fn allowance_list(allowance: &FileAllowance) -> Option<Vec<String>> {
    allowance
        .entries()
        .map(|entries| entries.iter().cloned().collect())
}

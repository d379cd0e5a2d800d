//! Runs candidate code under a [`Policy`] and classifies the outcome.
//!
//! Every round is a fresh interpreter process started in the round's working
//! directory. The harness, the candidate and the control file live in a
//! private control directory the candidate cannot reach through the working
//! directory.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::harness::{
    HarnessControl, CANDIDATE_FILE, CONTROL_FILE, HARNESS_FILE, HARNESS_SOURCE,
};
use super::policy::Policy;
use super::report::{locate, HarnessReport};
use super::supervisor::{supervise, SupervisedExit};
use super::workspace::RunWorkspace;
use crate::code::CodeArtifact;
use crate::fault::{ExecutionFault, RunIssue};

/// Default interpreter command.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Lines of stderr quoted when the interpreter dies without a report.
const STDERR_TAIL_LINES: usize = 20;

/// What happened during one execution.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// First fault encountered, if any.
    pub fault: Option<ExecutionFault>,
    /// Non-fatal observations.
    pub issues: Vec<RunIssue>,
    /// Files present after the run that were not there before (relative).
    pub created_files: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.fault.is_none()
    }
}

/// Executes code artifacts in a separate interpreter process.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    interpreter: String,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

impl SandboxExecutor {
    /// Creates an executor that runs `interpreter`.
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    /// Runs `artifact` in `workspace` under `policy`.
    ///
    /// Candidate misbehaviour is reported through [`RunReport::fault`]; an
    /// `Err` means the host could not run the candidate at all.
    pub async fn execute(
        &self,
        artifact: &CodeArtifact,
        policy: &Policy,
        workspace: &RunWorkspace,
    ) -> Result<RunReport, SandboxError> {
        let control_dir = tempfile::Builder::new().prefix("codeloop-ctl-").tempdir()?;
        let control_root = control_dir.path().canonicalize()?;
        let home = control_root.join("home");
        let tmp = control_root.join("tmp");
        std::fs::create_dir_all(&home)?;
        std::fs::create_dir_all(&tmp)?;

        let control = HarnessControl::new(
            policy,
            &control_root,
            workspace.path(),
            vec![home.clone(), tmp.clone()],
        );
        std::fs::write(control_root.join(HARNESS_FILE), HARNESS_SOURCE)?;
        std::fs::write(control_root.join(CANDIDATE_FILE), artifact.source())?;
        let control_json = serde_json::to_vec_pretty(&control)
            .map_err(|e| SandboxError::Setup(format!("failed to encode control file: {}", e)))?;
        std::fs::write(control_root.join(CONTROL_FILE), control_json)?;

        let baseline = workspace.snapshot();
        let command = self.command(&control_root, workspace.path(), &home, &tmp, policy);
        debug!(
            interpreter = %self.interpreter,
            work_dir = %workspace.path().display(),
            response_id = artifact.response_id(),
            "Executing candidate"
        );

        let exit = supervise(command, policy.timeout()).await?;

        let mut created_files: Vec<String> = workspace
            .snapshot()
            .difference(&baseline)
            .cloned()
            .collect();
        created_files.sort();

        let (mut fault, issues) = if exit.timed_out {
            (Some(timeout_fault(artifact, policy, &control.position_path)), Vec::new())
        } else {
            match HarnessReport::from_file(&control.report_path) {
                Ok(report) => (
                    report.fault.map(|f| f.into_fault(artifact)),
                    report.issues,
                ),
                Err(e) => {
                    warn!(error = %e, "Harness report unavailable");
                    (Some(crash_fault(&exit)), Vec::new())
                }
            }
        };

        if fault.is_none() {
            let unexpected: Vec<String> = created_files
                .iter()
                .filter(|path| !policy.is_creation_allowed(path))
                .cloned()
                .collect();
            if !unexpected.is_empty() {
                fault = Some(ExecutionFault::UnexpectedFilesCreated { paths: unexpected });
            }
        }

        match &fault {
            Some(f) => info!(
                category = %f.category(),
                line = ?f.line(),
                duration_ms = exit.duration.as_millis() as u64,
                "Candidate run faulted"
            ),
            None => info!(
                duration_ms = exit.duration.as_millis() as u64,
                created = created_files.len(),
                "Candidate run completed"
            ),
        }

        Ok(RunReport {
            fault,
            issues,
            created_files,
            stdout: exit.stdout,
            stderr: exit.stderr,
            duration: exit.duration,
        })
    }

    fn command(
        &self,
        control_root: &Path,
        work_dir: &Path,
        home: &Path,
        tmp: &Path,
        policy: &Policy,
    ) -> Command {
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-B")
            .arg(control_root.join(HARNESS_FILE))
            .arg(control_root.join(CONTROL_FILE))
            .current_dir(work_dir)
            .env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }
        command
            .env("HOME", home)
            .env("TMPDIR", tmp)
            .env("MPLCONFIGDIR", tmp)
            .env("MPLBACKEND", "Agg")
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .envs(&policy.env);
        command
    }
}

fn timeout_fault(artifact: &CodeArtifact, policy: &Policy, position_path: &Path) -> ExecutionFault {
    let line = std::fs::read_to_string(position_path)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok());
    ExecutionFault::Timeout {
        seconds: policy.timeout_seconds.unwrap_or_default(),
        location: locate(artifact, line),
    }
}

fn crash_fault(exit: &SupervisedExit) -> ExecutionFault {
    let status = exit
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown status".to_string());
    let tail = stderr_tail(&exit.stderr);
    let message = if tail.is_empty() {
        format!("interpreter exited with {} before completing", status)
    } else {
        format!(
            "interpreter exited with {} before completing:\n{}",
            status, tail
        )
    };
    ExecutionFault::RuntimeFault {
        exception: "InterpreterExit".to_string(),
        message,
        location: None,
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

/// Error types for sandbox operations.
///
/// These describe host failures. Problems with the candidate itself are
/// [`ExecutionFault`] values inside a [`RunReport`].
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Interpreter '{interpreter}' is not available")]
    InterpreterUnavailable { interpreter: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail() {
        let stderr: String = (1..=30).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 11"));
        assert!(tail.ends_with("line 30"));
        assert_eq!(stderr_tail(""), "");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_host_error() {
        let executor = SandboxExecutor::new("codeloop-no-such-python");
        let workspace_dir = tempfile::TempDir::new().unwrap();
        let workspace = RunWorkspace::existing(workspace_dir.path());
        let artifact = CodeArtifact::from_source("x = 1");

        let err = executor
            .execute(&artifact, &Policy::default(), &workspace)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InterpreterUnavailable { .. }));
    }

    #[test]
    fn test_timeout_fault_reads_position() {
        let dir = tempfile::TempDir::new().unwrap();
        let position = dir.path().join("position");
        std::fs::write(&position, "3").unwrap();
        let artifact = CodeArtifact::from_source("import time\n# line 2\ntime.sleep(2)\n");
        let policy = Policy::default().with_timeout(Duration::from_secs(1));

        let fault = timeout_fault(&artifact, &policy, &position);
        match fault {
            ExecutionFault::Timeout { seconds, location } => {
                assert_eq!(seconds, 1.0);
                let location = location.unwrap();
                assert_eq!(location.line, 3);
                assert_eq!(location.text, "time.sleep(2)");
            }
            other => panic!("unexpected fault: {:?}", other),
        }

        let fault = timeout_fault(&artifact, &policy, &dir.path().join("absent"));
        assert!(fault.location().is_none());
    }
}

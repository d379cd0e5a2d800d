//! Policy-enforcing execution of candidate code.
//!
//! # Layers
//!
//! - [`policy`]: what the candidate may do
//! - [`harness`]: the Python mediation harness and its control file
//! - [`supervisor`]: process-group supervision and wall-clock timeout
//! - [`report`]: harness report to [`ExecutionFault`] translation
//! - [`workspace`]: per-round working directories
//! - [`executor`]: ties the above together
//!
//! # Example
//!
//! ```ignore
//! use codeloop::code::CodeArtifact;
//! use codeloop::sandbox::{Policy, SandboxExecutor, WorkspaceManager};
//!
//! let policy = Policy::default().with_timeout(std::time::Duration::from_secs(5));
//! let workspaces = WorkspaceManager::new(&policy)?;
//! let workspace = workspaces.fresh_round()?;
//! let report = SandboxExecutor::default()
//!     .execute(&CodeArtifact::from_source("x = 1"), &policy, &workspace)
//!     .await?;
//! assert!(report.is_clean());
//! ```

pub mod executor;
pub mod harness;
pub mod policy;
pub mod report;
pub mod supervisor;
pub mod workspace;

pub use crate::fault::{ExecutionFault, FaultCategory, SourceLocation};
pub use executor::{RunReport, SandboxError, SandboxExecutor, DEFAULT_INTERPRETER};
pub use policy::{FileAllowance, Policy};
pub use supervisor::{supervise, SupervisedExit};
pub use workspace::{RunWorkspace, WorkspaceManager};

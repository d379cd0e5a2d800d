//! codeloop: run LLM-written code under a sandbox policy and debug it with the model.
//!
//! A response is reduced to a single code block, executed in a separate
//! interpreter process behind import, call and file-access guards, and
//! classified into an [`ExecutionFault`] when it misbehaves. The debug loop
//! turns each fault into a corrective message and asks the model again,
//! within attempt and iteration limits.

pub mod cli;
pub mod code;
pub mod conversation;
pub mod debugger;
pub mod error;
pub mod fault;
pub mod llm;
pub mod metrics;
pub mod output;
pub mod sandbox;

// Re-export commonly used types
pub use error::{ConfigError, ConversationError, LlmError};
pub use fault::{ArtifactFiles, ExecutionFault, ExecutionResult, FaultCategory};

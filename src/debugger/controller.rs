//! The debug loop: request, extract, execute, validate, correct.
//!
//! The controller owns the attempt and iteration counters. Each attempt
//! starts from the conversation snapshot taken on entry; each iteration asks
//! the model for a response and runs one round over it. The first successful
//! round ends the loop immediately.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::LoopConfig;
use super::prompts::corrective_message;
use crate::code::{extract, CodeArtifact};
use crate::conversation::Converser;
use crate::error::{ConfigError, ConversationError, LlmError};
use crate::fault::{ExecutionFault, ExecutionResult};
use crate::llm::Message;
use crate::metrics::MetricsCollector;
use crate::output::conclude;
use crate::sandbox::{RunWorkspace, SandboxError, SandboxExecutor, WorkspaceManager};

/// Name of the snapshot every attempt restores.
pub const INITIAL_SNAPSHOT: &str = "initial";

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Attempting,
    Succeeded,
    AttemptExhausted,
    GaveUp,
}

/// Final status of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Succeeded,
    GaveUp,
}

impl LoopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStatus::Succeeded => "succeeded",
            LoopStatus::GaveUp => "gave_up",
        }
    }
}

/// One iteration of the loop, for transcripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub attempt: usize,
    pub iteration: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Identifier of the response the round ran on.
    pub response_id: String,
    /// `None` for the successful round.
    pub fault: Option<ExecutionFault>,
}

/// Result of a whole loop.
#[derive(Debug, Clone, Serialize)]
pub struct DebugOutcome {
    /// Unique identifier of this loop run.
    pub run_id: Uuid,
    pub status: LoopStatus,
    /// Artifact on success, last fault when giving up.
    pub result: ExecutionResult,
    /// Accepted code, on success.
    pub code: Option<CodeArtifact>,
    /// Attempt of the final round.
    pub attempt_index: usize,
    /// Iteration of the final round within its attempt.
    pub iteration_index: usize,
    pub total_iterations: usize,
    pub rounds: Vec<RoundRecord>,
}

impl DebugOutcome {
    pub fn is_success(&self) -> bool {
        self.status == LoopStatus::Succeeded
    }
}

/// Result of running a single response or code artifact.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub result: ExecutionResult,
    pub artifact: Option<CodeArtifact>,
    /// Time spent executing, when the candidate ran.
    pub duration: Option<Duration>,
    pub stdout: String,
    pub stderr: String,
}

impl RoundOutcome {
    fn rejected(fault: ExecutionFault) -> Self {
        Self {
            result: ExecutionResult::Failure(fault),
            artifact: None,
            duration: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Outcome label used in metrics: `success` or the fault category.
    pub fn label(&self) -> &'static str {
        match self.result.fault() {
            Some(fault) => fault.category().as_str(),
            None => "success",
        }
    }
}

/// Drives the debug loop against a [`Converser`].
pub struct DebugController {
    config: LoopConfig,
    executor: SandboxExecutor,
    state: LoopState,
    metrics: MetricsCollector,
}

impl DebugController {
    /// Creates a controller for `config`.
    pub fn new(config: LoopConfig) -> Self {
        let executor = SandboxExecutor::new(config.interpreter.clone());
        Self {
            config,
            executor,
            state: LoopState::Idle,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs the loop until a round succeeds or the attempts run out.
    ///
    /// The conversation should end with the code request. On return it holds
    /// the exchange of the final attempt.
    pub async fn run<C>(&mut self, converser: &mut C) -> Result<DebugOutcome, DebugError>
    where
        C: Converser + ?Sized,
    {
        self.config.validate()?;
        let workspaces = WorkspaceManager::new(&self.config.policy)?;

        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            max_attempts = self.config.max_attempts,
            max_iterations = self.config.max_iterations_per_attempt,
            "Starting debug loop"
        );
        converser.save_snapshot(INITIAL_SNAPSHOT);

        let mut rounds = Vec::new();
        let mut last_fault: Option<ExecutionFault> = None;
        let mut total_iterations = 0;

        for attempt in 0..self.config.max_attempts {
            converser.restore_snapshot(INITIAL_SNAPSHOT)?;
            self.state = LoopState::Attempting;
            if attempt > 0 {
                info!(
                    attempt = attempt + 1,
                    max_attempts = self.config.max_attempts,
                    "Debugging failed, retrying from the initial conversation"
                );
            }

            for iteration in 0..self.config.max_iterations_per_attempt {
                total_iterations += 1;
                let response = converser.next_response().await?;

                let started_at = Utc::now();
                let start = Instant::now();
                let round = self.run_round(&response, &workspaces).await?;
                self.metrics
                    .record_round(round.label(), round.duration.map(|d| d.as_secs_f64()));

                rounds.push(RoundRecord {
                    attempt,
                    iteration,
                    started_at,
                    duration_ms: start.elapsed().as_millis() as u64,
                    response_id: crate::code::artifact::response_id(&response),
                    fault: round.result.fault().cloned(),
                });

                let fault = match round.result {
                    ExecutionResult::Success(files) => {
                        self.state = LoopState::Succeeded;
                        self.metrics.record_loop(LoopStatus::Succeeded.as_str());
                        info!(
                            run_id = %run_id,
                            attempt,
                            iteration,
                            total_iterations,
                            "Round succeeded"
                        );
                        return Ok(DebugOutcome {
                            run_id,
                            status: LoopStatus::Succeeded,
                            result: ExecutionResult::Success(files),
                            code: round.artifact,
                            attempt_index: attempt,
                            iteration_index: iteration,
                            total_iterations,
                            rounds,
                        });
                    }
                    ExecutionResult::Failure(fault) => fault,
                };

                warn!(
                    attempt,
                    iteration,
                    category = %fault.category(),
                    line = ?fault.line(),
                    "Round failed"
                );
                match corrective_message(&fault, &self.config.permitted_packages) {
                    Some(message) => converser.append_message(Message::user(message)),
                    None => {
                        debug!("Discarding response without a single code block");
                        converser.pop_last();
                    }
                }
                last_fault = Some(fault);
            }

            self.state = LoopState::AttemptExhausted;
        }

        self.state = LoopState::GaveUp;
        self.metrics.record_loop(LoopStatus::GaveUp.as_str());

        let fault = last_fault.ok_or_else(|| {
            ConfigError::ValidationFailed("loop ended without running a round".to_string())
        })?;
        warn!(
            run_id = %run_id,
            total_iterations,
            category = %fault.category(),
            "Giving up after exhausting all attempts"
        );

        let last = rounds.last();
        Ok(DebugOutcome {
            run_id,
            status: LoopStatus::GaveUp,
            result: ExecutionResult::Failure(fault),
            code: None,
            attempt_index: last.map(|r| r.attempt).unwrap_or_default(),
            iteration_index: last.map(|r| r.iteration).unwrap_or_default(),
            total_iterations,
            rounds,
        })
    }

    /// Extracts code from `response` and runs it in a fresh workspace.
    pub async fn run_round(
        &self,
        response: &str,
        workspaces: &WorkspaceManager,
    ) -> Result<RoundOutcome, SandboxError> {
        let artifact = match extract(response) {
            Ok(artifact) => artifact,
            Err(fault) => return Ok(RoundOutcome::rejected(fault)),
        };
        let workspace = workspaces.fresh_round()?;
        self.run_artifact(artifact, &workspace).await
    }

    /// Runs `artifact` in `workspace` and validates the outputs.
    pub async fn run_artifact(
        &self,
        artifact: CodeArtifact,
        workspace: &RunWorkspace,
    ) -> Result<RoundOutcome, SandboxError> {
        let report = self
            .executor
            .execute(&artifact, &self.config.policy, workspace)
            .await?;
        let duration = report.duration;
        let stdout = report.stdout.clone();
        let stderr = report.stderr.clone();
        let result = conclude(report, workspace.path(), &self.config.requirements);

        Ok(RoundOutcome {
            result,
            artifact: Some(artifact),
            duration: Some(duration),
            stdout,
            stderr,
        })
    }
}

/// Errors that end a loop early.
///
/// Faults in candidate code never surface here; they drive corrections.
#[derive(Debug, Error)]
pub enum DebugError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Conversation, LlmConversation};
    use crate::llm::ReplayProvider;
    use std::sync::Arc;

    fn converser(responses: Vec<String>) -> LlmConversation {
        LlmConversation::new(
            Arc::new(ReplayProvider::new(responses)),
            Conversation::from_messages(vec![Message::user("Write code that saves the answer.")]),
        )
    }

    #[tokio::test]
    async fn test_gives_up_after_budget_on_extraction_failures() {
        let config = LoopConfig::default().with_max_attempts(2).with_max_iterations(3);
        let responses = vec!["No code here, sorry.".to_string(); 6];
        let mut converser = converser(responses);
        let mut controller = DebugController::new(config);

        let outcome = controller.run(&mut converser).await.unwrap();

        assert_eq!(outcome.status, LoopStatus::GaveUp);
        assert_eq!(controller.state(), LoopState::GaveUp);
        assert_eq!(outcome.total_iterations, 6);
        assert_eq!(outcome.rounds.len(), 6);
        assert_eq!(outcome.attempt_index, 1);
        assert_eq!(outcome.iteration_index, 2);
        assert_eq!(
            outcome.result.fault(),
            Some(&ExecutionFault::ExtractionFailure { blocks_found: 0 })
        );
        // Rejected responses are popped, leaving only the request.
        assert_eq!(converser.history().len(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let mut converser = converser(vec!["```\n```\n```\n```".to_string()]);
        let mut controller = DebugController::new(LoopConfig::default());

        let err = controller.run(&mut converser).await.unwrap_err();
        assert!(matches!(err, DebugError::Llm(LlmError::ReplayExhausted { served: 1 })));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_requests() {
        let mut converser = converser(vec![]);
        let mut controller = DebugController::new(LoopConfig::default().with_max_attempts(0));

        let err = controller.run(&mut converser).await.unwrap_err();
        assert!(matches!(err, DebugError::Config(_)));
        assert_eq!(controller.state(), LoopState::Idle);
    }

    #[test]
    fn test_round_outcome_label() {
        let round = RoundOutcome::rejected(ExecutionFault::ExtractionFailure { blocks_found: 2 });
        assert_eq!(round.label(), "extraction_failure");
    }
}

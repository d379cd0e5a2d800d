//! Deterministic replay provider.
//!
//! Serves a recorded list of responses in order, one per `generate` call.
//! Used by tests and by `codeloop run --replay` to reproduce a session
//! without a live model. Running out of responses is an error: a replay that
//! is asked for more responses than were recorded has diverged.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::litellm::{GenerationRequest, GenerationResponse, LlmProvider};
use crate::error::LlmError;

/// An [`LlmProvider`] that replays pre-recorded responses.
pub struct ReplayProvider {
    state: Mutex<ReplayState>,
}

struct ReplayState {
    pending: VecDeque<String>,
    served: usize,
}

impl ReplayProvider {
    /// Create a provider that will serve `responses` in order.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(ReplayState {
                pending: responses.into_iter().map(Into::into).collect(),
                served: 0,
            }),
        }
    }

    /// Load responses from a JSON file containing an array of strings.
    pub fn from_json_file(path: &Path) -> Result<Self, LlmError> {
        let raw = std::fs::read_to_string(path)?;
        let responses: Vec<String> = serde_json::from_str(&raw)
            .map_err(|e| LlmError::ParseError(format!("invalid replay file: {}", e)))?;
        Ok(Self::new(responses))
    }

    /// Number of responses served so far.
    pub async fn served(&self) -> usize {
        self.state.lock().await.served
    }

    /// Number of responses not yet served.
    pub async fn remaining(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[async_trait]
impl LlmProvider for ReplayProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let mut state = self.state.lock().await;
        let content = state
            .pending
            .pop_front()
            .ok_or(LlmError::ReplayExhausted {
                served: state.served,
            })?;
        state.served += 1;
        debug!(
            served = state.served,
            history = request.messages.len(),
            "Replaying recorded response"
        );

        Ok(GenerationResponse {
            id: format!("replay-{}", state.served),
            model: if request.model.is_empty() {
                "replay".to_string()
            } else {
                request.model
            },
            content,
            finish_reason: Some("stop".to_string()),
            completion_tokens: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replay_serves_in_order_then_errors() {
        let provider = ReplayProvider::new(["first", "second"]);

        let request = GenerationRequest::new("", vec![Message::user("go")]);
        let first = provider.generate(request.clone()).await.unwrap();
        assert_eq!(first.content, "first");
        let second = provider.generate(request.clone()).await.unwrap();
        assert_eq!(second.content, "second");
        assert_eq!(provider.served().await, 2);
        assert_eq!(provider.remaining().await, 0);

        let err = provider.generate(request).await.unwrap_err();
        assert!(matches!(err, LlmError::ReplayExhausted { served: 2 }));
    }

    #[test]
    fn test_from_json_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("replay.json");
        std::fs::write(&path, r#"["a", "b", "c"]"#).unwrap();

        let provider = ReplayProvider::from_json_file(&path).unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert_eq!(rt.block_on(provider.remaining()), 3);
    }

    #[test]
    fn test_from_json_file_rejects_objects() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("replay.json");
        std::fs::write(&path, r#"{"a": 1}"#).unwrap();

        assert!(matches!(
            ReplayProvider::from_json_file(&path),
            Err(LlmError::ParseError(_))
        ));
    }
}

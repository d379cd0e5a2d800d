//! The loop controller's view of the conversational collaborator.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::history::Conversation;
use crate::error::{ConversationError, LlmError};
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::metrics::MetricsCollector;

/// A conversation that can ask a model for its next turn.
///
/// `next_response` sends the current history to the model and appends the
/// reply as an assistant message before returning its text.
#[async_trait]
pub trait Converser: Send {
    /// Requests the next response over the current history.
    async fn next_response(&mut self) -> Result<String, LlmError>;

    /// Appends a message to the history.
    fn append_message(&mut self, message: Message);

    /// Drops the most recent message.
    fn pop_last(&mut self) -> Option<Message>;

    /// Captures the current history under `name`.
    fn save_snapshot(&mut self, name: &str);

    /// Rolls the history back to the snapshot `name`.
    fn restore_snapshot(&mut self, name: &str) -> Result<(), ConversationError>;

    /// Current message history.
    fn history(&self) -> &[Message];
}

/// [`Converser`] backed by an [`LlmProvider`].
pub struct LlmConversation {
    provider: Arc<dyn LlmProvider>,
    conversation: Conversation,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl LlmConversation {
    /// Creates a conversation that will query `provider`.
    ///
    /// An empty model name lets the provider pick its default.
    pub fn new(provider: Arc<dyn LlmProvider>, conversation: Conversation) -> Self {
        Self {
            provider,
            conversation,
            model: String::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Sets the model to request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the response token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Returns the underlying conversation.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Consumes the converser and returns its conversation.
    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }

    fn build_request(&self) -> GenerationRequest {
        let mut request =
            GenerationRequest::new(self.model.clone(), self.conversation.messages().to_vec());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

#[async_trait]
impl Converser for LlmConversation {
    async fn next_response(&mut self) -> Result<String, LlmError> {
        let request = self.build_request();
        let start = Instant::now();
        let result = self.provider.generate(request).await;
        MetricsCollector::new()
            .record_llm_request(result.is_ok(), start.elapsed().as_secs_f64());

        let response = result?;
        if response.is_truncated() {
            warn!(
                response_id = %response.id,
                tokens = response.completion_tokens,
                "Model response hit the token limit"
            );
        }
        debug!(
            response_id = %response.id,
            model = %response.model,
            chars = response.content.len(),
            tokens = response.completion_tokens,
            "Received model response"
        );
        self.conversation.push(Message::assistant(response.content.clone()));
        Ok(response.content)
    }

    fn append_message(&mut self, message: Message) {
        self.conversation.push(message);
    }

    fn pop_last(&mut self) -> Option<Message> {
        self.conversation.pop()
    }

    fn save_snapshot(&mut self, name: &str) {
        self.conversation.save(name);
    }

    fn restore_snapshot(&mut self, name: &str) -> Result<(), ConversationError> {
        self.conversation.restore(name)
    }

    fn history(&self) -> &[Message] {
        self.conversation.messages()
    }
}

//! Chat completion client for LiteLLM-compatible endpoints.
//!
//! Defines the message and request types every provider shares, the
//! [`LlmProvider`] trait, and [`LiteLlmClient`], which talks to any
//! OpenAI-compatible `/chat/completions` endpoint (LiteLLM proxies,
//! OpenRouter, ...). The debug loop only ever needs one completion per
//! request, so a response carries a single message.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Default model used when neither the request nor the environment names one.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// HTTP timeout for a single completion request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Finish reason reported when the token limit cut the completion short.
const FINISH_LENGTH: &str = "length";

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Returns true if this message was produced by the model.
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

/// The conversation so far, plus sampling options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier; empty lets the provider pick its default.
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// One completed model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Provider-assigned identifier of the completion.
    pub id: String,
    /// Model that actually answered.
    pub model: String,
    /// Text of the assistant message.
    pub content: String,
    /// Why generation stopped, when the provider says.
    pub finish_reason: Option<String>,
    /// Tokens generated for this completion; 0 when not reported.
    pub completion_tokens: u32,
}

impl GenerationResponse {
    /// True when the token limit cut the completion short. A truncated reply
    /// usually lacks the closing fence of its code block.
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some(FINISH_LENGTH)
    }
}

/// Something that can answer a [`GenerationRequest`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for LiteLLM-compatible APIs.
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl LiteLlmClient {
    /// Create a client for `api_base` (e.g. `http://localhost:4000`).
    pub fn new(api_base: String, api_key: Option<String>, default_model: String) -> Self {
        Self {
            api_base,
            api_key,
            default_model,
            http_client: build_http_client(),
        }
    }

    /// Create a new LiteLLM client from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `LITELLM_API_BASE`: Base URL for the API (required)
    /// - `LITELLM_API_KEY`: API key for authentication (optional)
    /// - `LITELLM_DEFAULT_MODEL`: Default model (defaults to [`DEFAULT_MODEL`])
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiBase` if `LITELLM_API_BASE` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LITELLM_API_KEY").ok();
        let default_model =
            env::var("LITELLM_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_base, api_key, default_model))
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

fn build_http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: String,
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ChatResponse {
    fn into_generation(self) -> Result<GenerationResponse, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("No choices in LLM response".to_string()))?;
        let content = choice
            .message
            .content
            .ok_or_else(|| LlmError::ParseError("No content in LLM response".to_string()))?;

        Ok(GenerationResponse {
            id: self.id,
            model: self.model,
            content,
            finish_reason: choice.finish_reason,
            completion_tokens: self.usage.map(|u| u.completion_tokens).unwrap_or_default(),
        })
    }
}

/// Maps a non-success status and its body to an [`LlmError`].
fn status_error(status: u16, body: String) -> LlmError {
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);
    if status == 429 {
        LlmError::RateLimited(message)
    } else {
        LlmError::ApiError {
            code: status,
            message,
        }
    }
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };
        let body = ChatRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http_request = self
            .http_client
            .post(self.completions_url())
            .header("X-Title", "codeloop")
            .json(&body);
        if let Some(ref api_key) = self.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let http_response = http_request
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(status_error(status.as_u16(), text));
        }

        let parsed: ChatResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;
        parsed.into_generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are helpful.");

        assert!(!Message::user("Hello").is_assistant());
        assert!(Message::assistant("Hi there!").is_assistant());
    }

    #[test]
    fn test_chat_request_omits_unset_options() {
        let messages = vec![Message::user("test")];
        let request = ChatRequest {
            model: "gpt-4",
            messages: &messages,
            temperature: Some(0.7),
            max_tokens: None,
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"gpt-4\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_chat_response_takes_first_choice() {
        let body = r#"{"id":"x","model":"m","choices":[
            {"index":0,"message":{"role":"assistant","content":"```python\nx = 1"},"finish_reason":"length"},
            {"index":1,"message":{"role":"assistant","content":"other"}}
        ],"usage":{"prompt_tokens":10,"completion_tokens":7,"total_tokens":17}}"#;
        let parsed: ChatResponse = serde_json::from_str(body).expect("should parse");
        let response = parsed.into_generation().unwrap();

        assert_eq!(response.content, "```python\nx = 1");
        assert_eq!(response.completion_tokens, 7);
        assert!(response.is_truncated());
    }

    #[test]
    fn test_chat_response_without_usage_or_content() {
        let body = r#"{"id":"x","model":"m","choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let response = serde_json::from_str::<ChatResponse>(body)
            .unwrap()
            .into_generation()
            .unwrap();
        assert_eq!(response.completion_tokens, 0);
        assert!(!response.is_truncated());

        let body = r#"{"id":"x","model":"m","choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let err = serde_json::from_str::<ChatResponse>(body)
            .unwrap()
            .into_generation()
            .unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));

        let body = r#"{"id":"x","model":"m","choices":[]}"#;
        let err = serde_json::from_str::<ChatResponse>(body)
            .unwrap()
            .into_generation()
            .unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
    }

    #[test]
    fn test_status_error_mapping() {
        let err = status_error(429, r#"{"error":{"message":"slow down"}}"#.to_string());
        assert!(matches!(err, LlmError::RateLimited(ref m) if m == "slow down"));

        let err = status_error(500, "upstream exploded".to_string());
        assert!(matches!(
            err,
            LlmError::ApiError { code: 500, ref message } if message == "upstream exploded"
        ));
    }

    #[test]
    fn test_litellm_client_new() {
        let client = LiteLlmClient::new(
            "http://localhost:4000/".to_string(),
            Some("test-key".to_string()),
            "gpt-4".to_string(),
        );

        assert_eq!(client.completions_url(), "http://localhost:4000/chat/completions");
        assert_eq!(client.default_model(), "gpt-4");
        assert!(client.has_api_key());
    }

    #[tokio::test]
    async fn test_litellm_client_generate_connection_error() {
        let client = LiteLlmClient::new(
            "http://localhost:65535".to_string(),
            None,
            "gpt-4".to_string(),
        );

        let request = GenerationRequest::new("gpt-4", vec![Message::user("test")]);
        let result = client.generate(request).await;

        assert!(matches!(result, Err(LlmError::RequestFailed(_))));
    }
}

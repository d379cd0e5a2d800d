//! LLM integration for codeloop.
//!
//! The debug loop never talks to a model directly; it asks a
//! [`crate::conversation::Converser`] for the next response, and the
//! converser delegates to an [`LlmProvider`]. Two providers ship with the
//! crate:
//!
//! - [`LiteLlmClient`]: any OpenAI-compatible chat completion endpoint.
//! - [`ReplayProvider`]: a recorded response list consumed in order.
//!
//! ```ignore
//! use codeloop::llm::{LiteLlmClient, LlmProvider, GenerationRequest, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Write the code")]);
//! let response = client.generate(request).await?;
//! println!("{}", response.content);
//! ```

pub mod litellm;
pub mod replay;

pub use litellm::{
    GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, DEFAULT_MODEL,
};
pub use replay::ReplayProvider;

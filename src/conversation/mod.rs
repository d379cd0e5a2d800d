//! Conversation state shared with the model.
//!
//! [`Conversation`] is the message log with named snapshots; [`Converser`] is
//! the interface the debug loop drives (request a response, append, pop,
//! snapshot, restore). [`LlmConversation`] implements it over any
//! [`crate::llm::LlmProvider`].

pub mod converser;
pub mod history;

pub use converser::{Converser, LlmConversation};
pub use history::Conversation;

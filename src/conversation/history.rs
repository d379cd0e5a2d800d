//! Append-only message log with named snapshots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConversationError;
use crate::llm::Message;

/// Conversation history shared between the loop controller and the model.
///
/// Messages are only ever appended or popped from the end. A snapshot
/// captures the full message list under a name; restoring it replaces the
/// current list wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
    #[serde(skip)]
    snapshots: HashMap<String, Vec<Message>>,
}

impl Conversation {
    /// Creates an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation seeded with the given messages.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            snapshots: HashMap::new(),
        }
    }

    /// Appends a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Removes and returns the last message.
    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop()
    }

    /// Returns the last message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Saves the current message list under `name`, replacing any earlier
    /// snapshot with the same name.
    pub fn save(&mut self, name: &str) {
        debug!(snapshot = name, messages = self.messages.len(), "Saving conversation snapshot");
        self.snapshots.insert(name.to_string(), self.messages.clone());
    }

    /// Restores the message list saved under `name`.
    pub fn restore(&mut self, name: &str) -> Result<(), ConversationError> {
        let saved = self
            .snapshots
            .get(name)
            .ok_or_else(|| ConversationError::UnknownSnapshot(name.to_string()))?;
        debug!(
            snapshot = name,
            discarded = self.messages.len().saturating_sub(saved.len()),
            "Restoring conversation snapshot"
        );
        self.messages = saved.clone();
        Ok(())
    }

    /// Returns true if a snapshot named `name` exists.
    pub fn has_snapshot(&self, name: &str) -> bool {
        self.snapshots.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user("hi"));
        conversation.push(Message::assistant("hello"));
        assert_eq!(conversation.len(), 2);

        let popped = conversation.pop().unwrap();
        assert_eq!(popped.content, "hello");
        assert_eq!(conversation.last().unwrap().content, "hi");
    }

    #[test]
    fn test_restore_yields_identical_state() {
        let mut conversation = Conversation::from_messages(vec![
            Message::system("sys"),
            Message::user("write code"),
        ]);
        conversation.save("initial");
        let before = conversation.messages().to_vec();

        conversation.push(Message::assistant("bad code"));
        conversation.push(Message::user("fix it"));
        conversation.push(Message::assistant("still bad"));
        conversation.restore("initial").unwrap();

        assert_eq!(conversation.len(), before.len());
        assert_eq!(conversation.messages(), before.as_slice());

        // Restoring twice is stable.
        conversation.push(Message::assistant("again"));
        conversation.restore("initial").unwrap();
        assert_eq!(conversation.messages(), before.as_slice());
    }

    #[test]
    fn test_restore_unknown_snapshot() {
        let mut conversation = Conversation::new();
        let err = conversation.restore("missing").unwrap_err();
        assert!(matches!(err, ConversationError::UnknownSnapshot(name) if name == "missing"));
        assert!(!conversation.has_snapshot("missing"));
    }
}

//! Conversation history: the prompt and feedback channel for self-correction.
//!
//! [`ConversationHistory`] is an append-only log of role-tagged [`Message`]s.
//! Each generation call owns exactly one history; the whole log is resent to
//! the backend on every attempt, and corrective feedback is appended after
//! each failed attempt.

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// System instructions.
    System,
    /// User input (including corrective feedback).
    User,
    /// A completion produced by the backend.
    Assistant,
}

/// A single message in a conversation. Immutable once appended.
#[derive(Debug, Clone)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// The message content.
    pub content: String,
}

impl Message {
    /// Create a message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered, append-only log of messages exchanged with a backend.
///
/// Insertion order is significant: it defines both the prompt order and the
/// causal feedback chain. Past messages are never mutated or removed. The
/// history lives for one generation call and is discarded afterwards.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. This is the only way the history changes.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    /// Read-only snapshot of the accumulated messages, in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages appended so far.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

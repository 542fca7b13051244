//! Ordered conversation log with a bounded context-window view.
//!
//! [`ChatLog`] is append-only from the caller's perspective: entries are
//! never reordered or removed, and mutation is limited to status/content
//! updates on trailing entries while a response streams in. The context
//! window is a read-time view, not a mutation.

use super::message::{ChatMessage, DeliveryStatus, Role};

/// Ordered sequence of chat messages for one conversation.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from restored messages, seeding a greeting when empty.
    ///
    /// A `None` or empty restore (first run, or a discarded corrupt blob)
    /// yields a single already-read model greeting.
    pub fn restore_or_seed(stored: Option<Vec<ChatMessage>>, greeting: &str) -> Self {
        match stored {
            Some(messages) if !messages.is_empty() => Self { messages },
            _ => Self {
                messages: vec![ChatMessage::model_read(greeting)],
            },
        }
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent `window` entries with non-empty content, oldest
    /// first. This is the slice sent as model context.
    pub fn context_slice(&self, window: usize) -> Vec<&ChatMessage> {
        let start = self.messages.len().saturating_sub(window);
        self.messages[start..]
            .iter()
            .filter(|m| !m.content.is_empty())
            .collect()
    }

    /// Whether the trailing entry is an in-flight model placeholder.
    pub fn has_open_placeholder(&self) -> bool {
        self.messages.last().is_some_and(ChatMessage::is_placeholder)
    }

    /// Append an entry.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append streamed text to the trailing entry's content.
    pub fn append_to_last_content(&mut self, chunk: &str) {
        if let Some(last) = self.messages.last_mut() {
            last.content.push_str(chunk);
        }
    }

    /// Replace the trailing entry's content (failure-message merge).
    pub fn set_last_content(&mut self, content: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            last.content = content.into();
        }
    }

    /// Mark the trailing entry as read.
    pub fn mark_last_read(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            last.status = DeliveryStatus::Read;
        }
    }

    /// Mark the nearest user message before the trailing entry as read.
    ///
    /// Called when the first response chunk arrives; the user's input is
    /// treated as seen once the model starts replying.
    pub fn mark_preceding_user_read(&mut self) {
        let last = self.messages.len().saturating_sub(1);
        if let Some(msg) = self.messages[..last]
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::User)
        {
            msg.status = DeliveryStatus::Read;
        }
    }
}

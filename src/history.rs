//! Conversation history window.
//!
//! Keeps the recent exchange for model context. Only the last N entries are
//! ever sent to the model, so storage is capped at N and older turns fall
//! off the front.

use crate::model::{ChatMessage, Role};
use std::collections::VecDeque;

/// Fixed-capacity conversation history.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: VecDeque<ChatMessage>,
    window: usize,
}

impl ConversationHistory {
    /// Create a history keeping the last `window` entries.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Record a user utterance.
    pub fn push_user(&mut self, text: &str) {
        self.push(ChatMessage::user(text));
    }

    /// Record an assistant reply.
    pub fn push_assistant(&mut self, text: &str) {
        self.push(ChatMessage::assistant(text));
    }

    fn push(&mut self, message: ChatMessage) {
        if self.window == 0 {
            return;
        }
        if self.entries.len() >= self.window {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// The retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    /// Content of the most recent user entry, if any.
    #[must_use]
    pub fn last_user(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest() {
        let mut history = ConversationHistory::new(3);
        history.push_user("one");
        history.push_assistant("two");
        history.push_user("three");
        history.push_assistant("four");

        assert_eq!(history.len(), 3);
        let contents: Vec<&str> = history.entries().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three", "four"]);
    }

    #[test]
    fn last_user_skips_assistant_entries() {
        let mut history = ConversationHistory::new(10);
        history.push_user("add three tomatoes");
        history.push_assistant("Where?");
        assert_eq!(history.last_user(), Some("add three tomatoes"));
    }

    #[test]
    fn empty_history() {
        let history = ConversationHistory::new(10);
        assert!(history.is_empty());
        assert!(history.last_user().is_none());
    }

    #[test]
    fn zero_window_keeps_nothing() {
        let mut history = ConversationHistory::new(0);
        history.push_user("hello");
        assert!(history.is_empty());
    }
}

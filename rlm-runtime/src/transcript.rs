//! Append-only message history sent to the backend each turn

use crate::environment::SNAPSHOT_TAG;
use crate::provider::{ChatMessage, Role};

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    seed_len: usize,
}

impl Transcript {
    /// System prompt followed by the initial snapshot as a user entry
    pub fn seeded(system_prompt: impl Into<String>, snapshot: impl Into<String>) -> Self {
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(snapshot)];
        Self {
            seed_len: messages.len(),
            messages,
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append the per-iteration snapshot.
    ///
    /// Linked to the tool call when the code came through one, a user entry
    /// otherwise.
    pub fn push_status(&mut self, snapshot: impl Into<String>, tool_call_id: Option<&str>) {
        let entry = match tool_call_id {
            Some(id) => ChatMessage::tool_result(id, snapshot),
            None => ChatMessage::user(snapshot),
        };
        self.messages.push(entry);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Entries appended after the seed
    pub fn after_seed(&self) -> &[ChatMessage] {
        &self.messages[self.seed_len.min(self.messages.len())..]
    }

    /// Snapshot entries appended after the seed
    pub fn status_entries(&self) -> impl Iterator<Item = &ChatMessage> {
        self.after_seed().iter().filter(|m| {
            matches!(m.role, Role::User | Role::Tool) && m.text().starts_with(SNAPSHOT_TAG)
        })
    }
}

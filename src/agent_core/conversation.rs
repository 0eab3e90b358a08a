//! ConversationState — the append-only record of one orchestration run.
//!
//! Responsibilities:
//! - Hold the ordered message log used as the model's context window
//! - Hold the artifact bundle produced by synthesis (empty until then)
//! - Build `Vec<ChatMessage>` for the inference client
//!
//! Each run owns its state exclusively; nothing here is shared across runs.

use serde::Serialize;

use crate::inference::types::{ChatMessage, Role};

use super::types::{ArtifactBundle, Message};

// ─── ConversationState ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    bundle: ArtifactBundle,
}

impl ConversationState {
    /// Start a conversation holding exactly the user's opening message.
    pub fn new(opening: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(opening)],
            bundle: ArtifactBundle::default(),
        }
    }

    /// Append a message. The log is never rewritten.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    /// Replace the bundle with a freshly synthesized one.
    pub(crate) fn set_bundle(&mut self, bundle: ArtifactBundle) {
        self.bundle = bundle;
    }

    /// The most recent assistant message, wherever it sits in the log.
    pub fn latest_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// The last message in the log.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Build the request history, optionally led by a system prompt.
    ///
    /// The system prompt is not part of the log; it is added on the wire only.
    pub fn to_chat_messages(&self, system_prompt: Option<&str>) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = system_prompt {
            out.push(ChatMessage {
                role: Role::System,
                content: Some(prompt.to_string()),
                tool_call_id: None,
                tool_calls: None,
            });
        }
        out.extend(self.messages.iter().map(Message::to_chat_message));
        out
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

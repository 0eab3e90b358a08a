//! Shared types for the agent core.
//!
//! Conversation messages, the artifact bundle, run states and the outcome
//! types handed back to the caller.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::inference::types::{ChatMessage, Role, ToolCall};

use super::conversation::ConversationState;

// ─── Conversation Messages ──────────────────────────────────────────────────

/// A single turn in the conversation. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// `user`, `assistant`, or `tool`.
    pub role: Role,
    /// Text content. Empty for assistant turns that only request tools.
    pub content: String,
    /// Tool calls requested by the assistant, in request order.
    pub tool_calls: Vec<ToolCall>,
    /// For `tool` role: the call this result answers.
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// Assistant turn that may carry tool calls alongside (or instead of) text.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content.into())
        }
    }

    /// Result of one tool call, fed back to the model.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content.into())
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Whether this message carries non-blank text.
    pub fn has_text(&self) -> bool {
        !self.content.trim().is_empty()
    }

    /// Wire form for the chat completions API.
    pub fn to_chat_message(&self) -> ChatMessage {
        let content = match (self.role, self.content.is_empty()) {
            // Assistant turns with only tool calls go out as "".
            (Role::Assistant, true) => None,
            _ => Some(self.content.clone()),
        };
        ChatMessage {
            role: self.role,
            content,
            tool_call_id: self.tool_call_id.clone(),
            tool_calls: if self.tool_calls.is_empty() {
                None
            } else {
                Some(self.tool_calls.iter().map(ToolCall::to_response).collect())
            },
        }
    }
}

// ─── Artifact Bundle ────────────────────────────────────────────────────────

/// Root layout template every bundle must contain.
pub const LAYOUT_PATH: &str = "layout/theme.liquid";

/// Theme settings schema every bundle must contain.
pub const SETTINGS_PATH: &str = "config/settings_schema.json";

/// Relative file path → file content. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactBundle(BTreeMap<String, String>);

impl ArtifactBundle {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(path, content)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for ArtifactBundle {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ArtifactBundle {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ─── Run State ──────────────────────────────────────────────────────────────

/// Nodes of the orchestration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    AwaitingModel,
    AwaitingTools,
    SynthesizingArtifact,
    Publishing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::AwaitingModel => "awaiting_model",
            RunState::AwaitingTools => "awaiting_tools",
            RunState::SynthesizingArtifact => "synthesizing_artifact",
            RunState::Publishing => "publishing",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

// ─── Outcomes ───────────────────────────────────────────────────────────────

/// Result of handing a bundle to the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub success: bool,
    /// Exit code of the publish command; `None` if it never ran or was killed.
    pub exit_code: Option<i32>,
    /// Captured verbatim.
    pub stdout: String,
    /// Captured verbatim.
    pub stderr: String,
    /// Why the command could not run (write failure, launch failure).
    pub diagnostic: Option<String>,
}

impl PublishOutcome {
    /// Outcome for a publish that failed before the command produced output.
    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// stdout followed by stderr, as shown to the user.
    pub fn captured_output(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: ConversationState,
    /// Every state visited, in order, ending with `Done`.
    pub trace: Vec<RunState>,
    /// Set when the run reached `Publishing`.
    pub publish: Option<PublishOutcome>,
}

impl RunOutcome {
    /// Text of the last assistant message, the reply shown to the user.
    pub fn final_reply(&self) -> Option<&str> {
        self.state
            .latest_assistant()
            .map(|m| m.content.as_str())
            .filter(|c| !c.trim().is_empty())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_only_assistant_serializes_empty_content() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "get_code".into(),
            arguments: serde_json::json!({"nodeId": "1:2"}),
        };
        let msg = Message::assistant_with_tools("", vec![call]);
        let json = serde_json::to_value(msg.to_chat_message()).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "get_code");
    }

    #[test]
    fn test_tool_result_wire_form() {
        let msg = Message::tool_result("call_1", "<div/>");
        let json = serde_json::to_value(msg.to_chat_message()).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["content"], "<div/>");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_has_text_ignores_whitespace() {
        assert!(!Message::assistant("  \n").has_text());
        assert!(Message::assistant("hi").has_text());
    }

    #[test]
    fn test_bundle_is_sorted() {
        let bundle: ArtifactBundle = [("z.liquid", "z"), ("a.liquid", "a")].into_iter().collect();
        assert_eq!(bundle.paths().collect::<Vec<_>>(), vec!["a.liquid", "z.liquid"]);
        assert_eq!(bundle.get("a.liquid"), Some("a"));
        assert!(!bundle.contains(LAYOUT_PATH));
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::SynthesizingArtifact.to_string(), "synthesizing_artifact");
    }

    #[test]
    fn test_captured_output_joins_streams() {
        let outcome = PublishOutcome {
            success: false,
            exit_code: Some(3),
            stdout: "out\n".into(),
            stderr: "err\n".into(),
            diagnostic: None,
        };
        assert_eq!(outcome.captured_output(), "out\nerr");
        assert_eq!(PublishOutcome::failed("boom").captured_output(), "");
    }
}

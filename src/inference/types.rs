//! Shared types for the inference client.
//!
//! These mirror the OpenAI Chat Completions API types, used for both
//! request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the conversation.
///
/// Serialization notes for OpenAI-compatible endpoints:
/// - `content` must be `""` (not `null`) for assistant messages with tool calls.
///   Several hosted routers reject `null` content on replayed assistant turns.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may contain tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

/// Custom serializer for `content`: emit `""` instead of `null` when `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// A parsed tool call extracted from the model's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call (generated if the model doesn't provide one).
    pub id: String,
    /// Tool name as exposed to the model.
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Convert into the wire format used when replaying assistant turns.
    pub fn to_response(&self) -> ToolCallResponse {
        ToolCallResponse {
            id: self.id.clone(),
            r#type: "function".to_string(),
            function: FunctionCallResponse {
                name: self.name.clone(),
                arguments: self.arguments.to_string(),
            },
        }
    }
}

/// Tool call as returned in the OpenAI response format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

/// Function call details in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

/// A complete (non-streaming) model reply.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Text content, `None` when absent or empty.
    pub content: Option<String>,
    /// Tool calls requested by the model, in the order it emitted them.
    pub tool_calls: Vec<ToolCall>,
    /// Why the model stopped: `"stop"`, `"tool_calls"`, `"length"`, …
    pub finish_reason: Option<String>,
}

impl Completion {
    /// True when the model produced neither text nor tool calls.
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty()
            && self
                .content
                .as_deref()
                .map(|c| c.trim().is_empty())
                .unwrap_or(true)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tools: Option<Vec<ToolDefinition>>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "test".to_string(),
            messages: vec![],
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: 0.7,
            max_tokens: None,
            stream: false,
        }
    }

    #[test]
    fn test_tools_omitted_in_tool_blind_request() {
        let json = serde_json::to_string(&request(None)).unwrap();
        assert!(!json.contains("tools"), "tools should be omitted when None");
        assert!(!json.contains("tool_choice"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_tools_present_in_tool_aware_request() {
        let tool = ToolDefinition {
            r#type: "function".into(),
            function: FunctionDefinition {
                name: "get_code".into(),
                description: "Fetch generated code for a node".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
        };
        let json = serde_json::to_string(&request(Some(vec![tool]))).unwrap();
        assert!(json.contains("\"tool_choice\":\"auto\""));
        assert!(json.contains("get_code"));
    }

    #[test]
    fn test_null_content_serialized_as_empty_string() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(vec![]),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"content\":\"\""));
        assert!(json.contains("\"role\":\"assistant\""));
    }

    #[test]
    fn test_tool_call_to_response_encodes_arguments() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "get_code".into(),
            arguments: serde_json::json!({"nodeId": "1:2"}),
        };
        let wire = call.to_response();
        assert_eq!(wire.r#type, "function");
        let decoded: serde_json::Value = serde_json::from_str(&wire.function.arguments).unwrap();
        assert_eq!(decoded["nodeId"], "1:2");
    }

    #[test]
    fn test_completion_is_empty() {
        assert!(Completion::default().is_empty());
        assert!(Completion {
            content: Some("   ".into()),
            ..Default::default()
        }
        .is_empty());
        assert!(!Completion {
            content: Some("hi".into()),
            ..Default::default()
        }
        .is_empty());
    }
}

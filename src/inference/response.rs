//! Chat completion response parsing.
//!
//! Turns the JSON body of a non-streaming `/chat/completions` reply into a
//! [`Completion`]: text content plus native tool calls with decoded arguments.

use serde::Deserialize;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{Completion, ToolCall};

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    /// Reasoning/thinking output from some routed models. Accepted so the
    /// body still deserializes; only `content` is surfaced.
    #[allow(dead_code)]
    reasoning: Option<String>,
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Deserialize)]
struct CompletionToolCall {
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Parse a tool call's JSON-string arguments.
///
/// An empty argument string means "no arguments" and becomes `{}`; some
/// routers send that for zero-parameter tools.
pub fn parse_native_json_tool_call(
    id: Option<&str>,
    name: &str,
    arguments_json: &str,
) -> Result<ToolCall, InferenceError> {
    let call_id = id
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));

    if name.is_empty() {
        return Err(InferenceError::ToolCallParseError {
            raw_response: arguments_json.to_string(),
            reason: "empty tool name".into(),
        });
    }

    let arguments = if arguments_json.trim().is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(arguments_json).map_err(|e| InferenceError::ToolCallParseError {
            raw_response: arguments_json.to_string(),
            reason: format!("invalid JSON arguments: {e}"),
        })?
    };

    Ok(ToolCall {
        id: call_id,
        name: name.to_string(),
        arguments,
    })
}

/// Parse a non-streaming response body into content and tool calls.
pub fn parse_completion_response(body: &str) -> Result<Completion, InferenceError> {
    let resp: CompletionBody =
        serde_json::from_str(body).map_err(|e| InferenceError::ResponseParse {
            reason: format!("failed to parse completion body: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::ResponseParse {
            reason: "empty choices array".into(),
        })?;

    let content = choice.message.content.filter(|c| !c.is_empty());

    let mut tool_calls = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        tool_calls.push(parse_native_json_tool_call(
            tc.id.as_deref(),
            &tc.function.name,
            &tc.function.arguments,
        )?);
    }

    let finish_reason = if tool_calls.is_empty() {
        choice.finish_reason
    } else {
        Some("tool_calls".into())
    };

    Ok(Completion {
        content,
        tool_calls,
        finish_reason,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! ModelGateway — one request/response exchange with the language model.
//!
//! Two modes:
//! - **tool-aware** (`invoke`): the model sees the history, the system prompt
//!   and the tool descriptors, and may answer with text, tool calls, or both
//! - **tool-blind** (`complete`): a single user prompt, no tools offered, text
//!   only. Used by the artifact synthesizer.
//!
//! The orchestrator holds the gateway as `Arc<dyn ModelGateway>`, so runs can
//! use independently configured gateways and tests can script one.

use async_trait::async_trait;

use crate::inference::types::{ChatMessage, FunctionDefinition, Role, ToolDefinition};
use crate::inference::{InferenceClient, InferenceError};
use crate::mcp_client::ToolDescriptor;

use super::conversation::ConversationState;
use super::types::Message;

/// Instructions prepended to every tool-aware request.
pub const SYSTEM_PROMPT: &str = "\
You are a design-to-theme assistant. You turn Figma designs, or designs the \
user describes in chat, into Shopify themes.

When the user gives you a Figma link or node id, use the available tools to \
fetch the design's code, structure and assets. Call tools as many times as you \
need; tool results are returned to you.

When you have enough of the design, reply with the complete UI as React/JSX or \
HTML with CSS, including layout, header, footer, sections and styling. That \
reply is converted into Liquid theme files, so make it self-contained. If the \
request is not about building a theme, answer normally.";

// ─── Trait ──────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Tool-aware call. The returned message always has role `assistant`.
    ///
    /// Fails with an unavailable error on transport failure and
    /// `InferenceError::EmptyResponse` when the reply has neither text nor
    /// tool calls.
    async fn invoke(
        &self,
        history: &ConversationState,
        tools: &[ToolDescriptor],
    ) -> Result<Message, InferenceError>;

    /// Tool-blind call: one prompt in, text out.
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;
}

// ─── InferenceClient ────────────────────────────────────────────────────────

/// Convert descriptors into OpenAI function-calling format.
pub fn to_tool_definitions(tools: &[ToolDescriptor]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            },
        })
        .collect()
}

#[async_trait]
impl ModelGateway for InferenceClient {
    async fn invoke(
        &self,
        history: &ConversationState,
        tools: &[ToolDescriptor],
    ) -> Result<Message, InferenceError> {
        let messages = history.to_chat_messages(Some(SYSTEM_PROMPT));
        // An empty `tools` array is rejected by several providers.
        let definitions = (!tools.is_empty()).then(|| to_tool_definitions(tools));

        let completion = self.chat_completion(messages, definitions).await?;
        if completion.is_empty() {
            return Err(InferenceError::EmptyResponse);
        }

        Ok(Message::assistant_with_tools(
            completion.content.unwrap_or_default(),
            completion.tool_calls,
        ))
    }

    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        let messages = vec![ChatMessage {
            role: Role::User,
            content: Some(prompt.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }];

        let completion = self.chat_completion(messages, None).await?;
        match completion.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(InferenceError::EmptyResponse),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ModelConfig;

    #[test]
    fn test_to_tool_definitions() {
        let tools = vec![ToolDescriptor {
            name: "get_code".into(),
            description: "Generate code for a Figma node".into(),
            input_schema: serde_json::json!({"type": "object"}),
            provider: "figma".into(),
        }];
        let defs = to_tool_definitions(&tools);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].r#type, "function");
        assert_eq!(defs[0].function.name, "get_code");
        assert_eq!(defs[0].function.parameters["type"], "object");
    }

    #[tokio::test]
    async fn test_invoke_unreachable_is_unavailable() {
        let client = InferenceClient::new(ModelConfig {
            base_url: "http://127.0.0.1:9/v1".into(),
            max_retries: 0,
            request_timeout_secs: 5,
            ..ModelConfig::default()
        })
        .unwrap();
        let state = ConversationState::new("hello");
        let err = client.invoke(&state, &[]).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}

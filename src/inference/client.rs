//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests to the configured endpoint
//! and returns the parsed reply. Transient failures are retried with
//! exponential backoff before surfacing to the caller.

use std::time::Duration;

use reqwest::Client as HttpClient;

use super::config::ModelConfig;
use super::errors::InferenceError;
use super::response::parse_completion_response;
use super::types::{ChatCompletionRequest, ChatMessage, Completion, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Base delay between retries (doubles each attempt).
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for a single OpenAI-compatible model endpoint.
///
/// Holds no per-conversation state, so one client can serve any number of
/// concurrent orchestration runs.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelConfig,
}

impl InferenceClient {
    /// Create a client from a validated model configuration.
    ///
    /// Does NOT check connectivity — that happens on the first request.
    pub fn new(config: ModelConfig) -> Result<Self, InferenceError> {
        config.validate()?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    /// The model identifier sent with every request.
    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    /// The endpoint root.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    // ─── Chat Completion ─────────────────────────────────────────────────

    /// Send a chat completion request, retrying transient failures.
    ///
    /// `tools: None` is the tool-blind mode: no `tools` or `tool_choice` keys
    /// are sent, so the model can only answer with text.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<Completion, InferenceError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let mut attempt: u32 = 0;
        loop {
            match self.try_request(&body).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retriable() && attempt < self.config.max_retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient inference failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Attempt a single request to the endpoint.
    async fn try_request(&self, body: &ChatCompletionRequest) -> Result<Completion, InferenceError> {
        let url = self.config.completions_url();

        // Log the request metadata (not the full body — it can be huge)
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            has_tools = body.tools.is_some(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "=== LLM REQUEST ==="
        );

        let mut request = self.http.post(&url).json(body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: self.config.request_timeout_secs,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response.text().await.map_err(|e| InferenceError::ResponseParse {
            reason: format!("failed to read response body: {e}"),
        })?;

        let completion = parse_completion_response(&body_text)?;

        tracing::info!(
            content_len = completion.content.as_deref().map(str::len).unwrap_or(0),
            tool_calls = completion.tool_calls.len(),
            finish_reason = ?completion.finish_reason,
            "=== LLM RESPONSE ==="
        );

        Ok(completion)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ModelConfig {
        ModelConfig {
            model: "test-model".into(),
            temperature: 0.2,
            api_key: String::new(),
            // Port 9 (discard) is never served in test environments.
            base_url: "http://127.0.0.1:9/v1".into(),
            max_tokens: None,
            request_timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ModelConfig {
            temperature: 3.0,
            ..test_config()
        };
        assert!(InferenceClient::new(config).is_err());
    }

    #[test]
    fn test_accessors() {
        let client = InferenceClient::new(test_config()).unwrap();
        assert_eq!(client.model_name(), "test-model");
        assert_eq!(client.base_url(), "http://127.0.0.1:9/v1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let client = InferenceClient::new(test_config()).unwrap();
        let err = client.chat_completion(vec![], None).await.unwrap_err();
        assert!(err.is_unavailable(), "expected unavailable, got {err:?}");
    }
}

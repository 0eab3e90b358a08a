//! JSON-RPC transports for MCP providers.
//!
//! Two wire forms are supported:
//! - **stdio**: line-delimited JSON on a child process's stdin/stdout
//! - **streamable HTTP**: one POST per message; the reply is either a JSON
//!   body or a short SSE stream carrying the response event

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Session header assigned by streamable-HTTP servers during `initialize`.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Connect timeout for HTTP providers.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Transport ───────────────────────────────────────────────────────────────

/// A connected provider channel, whichever wire form it uses.
pub enum Transport {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

impl Transport {
    /// Send a request and wait for the response with the matching id.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        match self {
            Transport::Stdio(t) => t.request(method, params).await,
            Transport::Http(t) => t.request(method, params).await,
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        match self {
            Transport::Stdio(t) => t.notify(method, params).await,
            Transport::Http(t) => t.notify(method, params).await,
        }
    }

    /// End the session. Later requests fail with a transport error.
    pub async fn close(&self) {
        match self {
            Transport::Stdio(t) => t.close().await,
            Transport::Http(t) => t.close().await,
        }
    }
}

// ─── Stdio ───────────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    /// `None` once closed.
    writer: Mutex<Option<ChildStdin>>,
    reader: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Create a new transport from a child process's stdin/stdout.
    pub fn new(server_name: &str, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            server_name: server_name.to_string(),
            writer: Mutex::new(Some(stdin)),
            reader: Mutex::new(BufReader::new(stdout)),
        }
    }

    async fn write_line(&self, mut json: String) -> Result<(), McpError> {
        json.push('\n');
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| self.transport_error("transport closed".into()))?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// The reader lock is taken before writing so two concurrent callers
    /// cannot steal each other's response lines.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)
            .map_err(|e| self.transport_error(format!("failed to serialize request: {e}")))?;

        let mut reader = self.reader.lock().await;
        self.write_line(json).await?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_error(
                    "provider stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == Some(id) => return Ok(resp),
                // Notification or a response to someone else — keep reading.
                Ok(_) => continue,
                // Not JSON-RPC — provider log output on stdout.
                Err(_) => {
                    tracing::trace!(provider = %self.server_name, line = trimmed, "skipping non-JSON-RPC line");
                    continue;
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notification).map_err(|e| {
            self.transport_error(format!("failed to serialize notification: {e}"))
        })?;
        self.write_line(json).await
    }

    /// Close the child's stdin, the stdio equivalent of a shutdown request.
    pub async fn close(&self) {
        self.writer.lock().await.take();
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }
}

// ─── Streamable HTTP ─────────────────────────────────────────────────────────

/// JSON-RPC over MCP Streamable HTTP.
pub struct HttpTransport {
    server_name: String,
    url: String,
    http: reqwest::Client,
    /// Session id handed out by the server on `initialize`.
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    /// Create a transport for `url`. No connection is made until the first message.
    pub fn new(server_name: &str, url: &str) -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| McpError::TransportError {
                server: server_name.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            server_name: server_name.to_string(),
            url: url.to_string(),
            http,
            session_id: Mutex::new(None),
        })
    }

    /// The session id, once the server assigned one.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<reqwest::Response, McpError> {
        let mut request = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);

        if let Some(session) = self.session_id.lock().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(format!("request to {} failed: {e}", self.url)))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.transport_error(format!("HTTP {}: {text}", status.as_u16())));
        }

        Ok(response)
    }

    /// Send a JSON-RPC request and return the response with the matching id.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let response = self.post(&req).await?;

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(format!("failed to read response body: {e}")))?;

        if is_sse {
            return find_sse_response(&body, id).ok_or_else(|| {
                self.transport_error(format!("no response for request {id} in event stream"))
            });
        }

        let resp: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| self.transport_error(format!("malformed JSON-RPC response: {e}")))?;
        if resp.id != Some(id) {
            return Err(self.transport_error(format!(
                "response id {:?} does not match request {id}",
                resp.id
            )));
        }
        Ok(resp)
    }

    /// Send a JSON-RPC notification. Servers answer `202 Accepted`.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    /// Terminate the session with a DELETE (best-effort; servers may answer 405).
    pub async fn close(&self) {
        let Some(session) = self.session_id.lock().await.take() else {
            return;
        };
        let result = self
            .http
            .delete(&self.url)
            .header(SESSION_HEADER, session)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(provider = %self.server_name, error = %e, "session delete failed");
        }
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }
}

/// Scan an SSE body for the `data:` event carrying the response to `id`.
///
/// Events are separated by blank lines; multiple `data:` lines in one event
/// are joined with newlines per the SSE spec.
pub fn find_sse_response(body: &str, id: u64) -> Option<JsonRpcResponse> {
    let normalized = body.replace("\r\n", "\n");
    for event in normalized.split("\n\n") {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| {
                line.strip_prefix("data:")
                    .map(|d| d.strip_prefix(' ').unwrap_or(d))
            })
            .collect();
        if data.is_empty() {
            continue;
        }
        if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&data.join("\n")) {
            if resp.id == Some(id) {
                return Some(resp);
            }
        }
    }
    None
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_request_id_is_monotonic() {
        let id1 = next_request_id();
        let id2 = next_request_id();
        assert!(id2 > id1);
    }

    #[test]
    fn test_extract_result_success() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: Some(1),
            result: Some(serde_json::json!({"text": "hello"})),
            error: None,
        };
        let result = extract_result(resp).unwrap();
        assert_eq!(result["text"], "hello");
    }

    #[test]
    fn test_extract_result_error() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: Some(1),
            result: None,
            error: Some(super::super::types::JsonRpcError {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        };
        match extract_result(resp).unwrap_err() {
            McpError::ServerError { code, message, .. } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_result_missing_both() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: Some(1),
            result: None,
            error: None,
        };
        assert!(matches!(
            extract_result(resp).unwrap_err(),
            McpError::ServerError { .. }
        ));
    }

    #[test]
    fn test_find_sse_response_skips_notifications() {
        let body = "event: message\r\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\r\n\
                    \r\n\
                    event: message\r\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\r\n\
                    \r\n";
        let resp = find_sse_response(body, 7).unwrap();
        assert_eq!(resp.id, Some(7));
        assert!(resp.result.is_some());
    }

    #[test]
    fn test_find_sse_response_joins_multiline_data() {
        let body = "data: {\"jsonrpc\":\"2.0\",\ndata: \"id\":3,\"result\":{}}\n\n";
        let resp = find_sse_response(body, 3).unwrap();
        assert_eq!(resp.id, Some(3));
    }

    #[test]
    fn test_find_sse_response_no_match() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        assert!(find_sse_response(body, 2).is_none());
    }

    #[tokio::test]
    async fn test_http_transport_unreachable() {
        let transport = HttpTransport::new("figma", "http://127.0.0.1:9/mcp").unwrap();
        let err = transport.request("initialize", None).await.unwrap_err();
        assert!(matches!(err, McpError::TransportError { .. }));
        assert!(transport.session_id().await.is_none());
    }
}

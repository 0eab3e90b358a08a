//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// A provider process failed to start.
    #[error("failed to spawn provider '{name}': {reason}")]
    SpawnFailed {
        name: String,
        reason: String,
    },

    /// The initialization handshake failed.
    #[error("provider '{name}' initialization failed: {reason}")]
    InitFailed {
        name: String,
        reason: String,
    },

    /// JSON-RPC communication error (malformed message, I/O error, HTTP error).
    #[error("transport error for provider '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// Provider returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Tool not found in the aggregated registry.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// Tool call arguments failed schema validation.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments {
        tool: String,
        reason: String,
    },

    /// A tool call timed out.
    #[error("tool call '{tool}' timed out after {timeout_ms}ms")]
    Timeout {
        tool: String,
        timeout_ms: u64,
    },

    /// Configuration error (no providers, bad provider entry).
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },

    /// A provider was unreachable or returned a malformed manifest.
    #[error("tool discovery failed for provider '{provider}': {reason}")]
    DiscoveryFailed {
        provider: String,
        reason: String,
    },
}

impl McpError {
    /// Wrap a connection/handshake failure as a discovery failure.
    pub fn into_discovery(self, provider: &str) -> McpError {
        match self {
            e @ McpError::DiscoveryFailed { .. } => e,
            other => McpError::DiscoveryFailed {
                provider: provider.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

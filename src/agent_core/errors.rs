//! Agent Core error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::inference::InferenceError;
use crate::mcp_client::McpError;

/// Errors that end a run before it starts.
///
/// Failures inside a run never surface as `AgentError`; they become assistant
/// messages or a `PublishOutcome`.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A tool provider was unreachable or returned a malformed manifest.
    #[error("tool discovery failed: {source}")]
    ToolDiscovery {
        #[source]
        source: McpError,
    },

    /// The model gateway could not be built from its configuration.
    #[error("model gateway error: {source}")]
    Gateway {
        #[source]
        source: InferenceError,
    },

    /// The configuration was unreadable or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The opening message was empty.
    #[error("cannot start a run without an opening message")]
    EmptyPrompt,
}

impl From<McpError> for AgentError {
    fn from(source: McpError) -> Self {
        AgentError::ToolDiscovery { source }
    }
}

impl From<InferenceError> for AgentError {
    fn from(source: InferenceError) -> Self {
        AgentError::Gateway { source }
    }
}

/// Errors from turning model text into an artifact bundle.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// There was no assistant text to synthesize from.
    #[error("no assistant text to synthesize a theme from")]
    EmptySource,

    /// The synthesis reply was not a JSON object after fence-stripping.
    #[error("could not parse theme files: {reason}")]
    Parse {
        reason: String,
        /// The reply as received, for logs.
        raw: String,
    },

    /// The tool-blind model call failed.
    #[error("synthesis model call failed: {0}")]
    Model(#[from] InferenceError),
}

/// Errors while writing a bundle to disk. Always folded into a `PublishOutcome`.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A bundle key would escape the artifact root or is not a relative path.
    #[error("unsafe artifact path '{key}': {reason}")]
    UnsafePath { key: String, reason: String },

    /// Filesystem failure while materializing the bundle.
    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

//! Inference Client — OpenAI-compatible API client for the language model.
//!
//! This module handles all communication with the model endpoint:
//! - Non-streaming chat completions, tool-aware or tool-blind
//! - Native JSON tool call decoding
//! - Retry with backoff for transient failures
//! - Endpoint configuration (`model:` section of `themeforge.yaml`)
//!
//! The client speaks the OpenAI Chat Completions API, so switching between
//! hosted routers and local runtimes is a config change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use client::InferenceClient;
pub use config::ModelConfig;
pub use errors::InferenceError;
pub use types::{ChatMessage, Completion, Role, ToolCall, ToolDefinition};

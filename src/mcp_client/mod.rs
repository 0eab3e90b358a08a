//! MCP Client — tool discovery and execution across tool providers.
//!
//! This module handles:
//! - Connecting to providers over stdio (child process) or Streamable HTTP
//! - JSON-RPC 2.0 communication and the MCP initialization handshake
//! - Tool discovery and aggregation across all providers
//! - Tool call routing, validation, and execution
//! - Provider shutdown at the end of the session
//!
//! The orchestrator sees only [`ToolCatalog`]: a read-only list of tool
//! descriptors plus `call_tool`.

pub mod catalog;
pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use catalog::{CatalogCache, ToolCatalog};
pub use errors::McpError;
pub use registry::ToolRegistry;
pub use types::{DiscoveryPolicy, ProviderConfig, ToolCallResult, ToolDescriptor};

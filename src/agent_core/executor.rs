//! ToolExecutor — the tool-execution capability seen by the orchestrator.
//!
//! The orchestrator never talks to providers directly; it asks an executor
//! for descriptors and hands it `(name, arguments)` pairs. [`ToolCatalog`]
//! is the production executor.

use async_trait::async_trait;

use crate::mcp_client::{McpError, ToolCallResult, ToolCatalog, ToolDescriptor};

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools the model may request. Read-only for the whole run.
    fn descriptors(&self) -> Vec<ToolDescriptor>;

    /// Execute one call. Provider-reported failures come back as
    /// `Ok(success: false)`; routing and transport failures as `Err`.
    async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError>;
}

#[async_trait]
impl ToolExecutor for ToolCatalog {
    fn descriptors(&self) -> Vec<ToolDescriptor> {
        ToolCatalog::descriptors(self)
    }

    async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        self.call_tool(name, arguments).await
    }
}

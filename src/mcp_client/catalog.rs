//! ToolCatalog — the discovered tool surface of all providers.
//!
//! Owns the provider connections and the aggregated registry, routes tool
//! calls to the owning provider, and converts provider-side failures into
//! unsuccessful `ToolCallResult`s the model can read.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;

use super::errors::McpError;
use super::lifecycle::{self, ConnectedProvider};
use super::registry::ToolRegistry;
use super::transport::extract_result;
use super::types::{CallToolResult, DiscoveryPolicy, ProviderConfig, ToolCallResult, ToolDescriptor};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for tool call execution.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

// ─── ToolCatalog ─────────────────────────────────────────────────────────────

/// Discovered tools across every reachable provider. Read-only after discovery.
pub struct ToolCatalog {
    providers: HashMap<String, ConnectedProvider>,
    registry: ToolRegistry,
    call_timeout: Duration,
}

impl ToolCatalog {
    /// Connect to every provider concurrently and build the registry.
    ///
    /// With [`DiscoveryPolicy::Abort`] the first failing provider (in name
    /// order) fails the whole discovery and already-connected providers are
    /// shut down again. With [`DiscoveryPolicy::SkipFailed`] failures are
    /// logged and the catalog holds what answered.
    pub async fn discover(
        configs: &BTreeMap<String, ProviderConfig>,
        policy: DiscoveryPolicy,
    ) -> Result<Self, McpError> {
        let results = lifecycle::connect_all(configs).await;

        let mut connected = Vec::new();
        let mut first_failure = None;
        for (name, result) in results {
            match result {
                Ok(provider) => {
                    tracing::info!(
                        provider = %name,
                        tool_count = provider.tools.len(),
                        "provider discovered"
                    );
                    connected.push(provider);
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "provider discovery failed");
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        if let (DiscoveryPolicy::Abort, Some(err)) = (policy, first_failure) {
            lifecycle::shutdown_all(&connected).await;
            return Err(err);
        }

        let registry = ToolRegistry::from_providers(
            connected
                .iter()
                .map(|p| (p.name.clone(), p.tools.clone()))
                .collect(),
        );
        tracing::info!(
            providers = connected.len(),
            tools = registry.len(),
            "tool catalog ready"
        );

        Ok(Self {
            providers: connected.into_iter().map(|p| (p.name.clone(), p)).collect(),
            registry,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        })
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// All tools as exposed to the model, in name order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Names of the providers that answered discovery, sorted.
    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Execute a tool call on the owning provider.
    ///
    /// Steps:
    /// 1. Validate the tool exists and required arguments are present
    /// 2. Send `tools/call` with the provider-local name, bounded by the timeout
    /// 3. Map `isError` results and JSON-RPC errors to `success: false`
    ///
    /// Transport failures and timeouts are returned as `Err`.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let start = Instant::now();

        let tool = self.registry.validate_tool_call(tool_name, &arguments)?;
        let provider = self
            .providers
            .get(&tool.provider)
            .ok_or(McpError::UnknownTool {
                name: tool_name.to_string(),
            })?;

        let params = serde_json::json!({
            "name": tool.remote_name,
            "arguments": arguments,
        });

        tracing::info!(tool = tool_name, provider = %tool.provider, "calling tool");

        let response = tokio::time::timeout(
            self.call_timeout,
            provider.transport.request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| McpError::Timeout {
            tool: tool_name.to_string(),
            timeout_ms: self.call_timeout.as_millis() as u64,
        })??;

        let elapsed = start.elapsed().as_millis() as u64;

        let (success, output) = match extract_result(response) {
            Ok(result) => match serde_json::from_value::<CallToolResult>(result.clone()) {
                Ok(call) => (!call.is_error, call.to_text()),
                Err(_) => (true, result.to_string()),
            },
            Err(McpError::ServerError { code, message, .. }) => {
                (false, format!("[{code}] {message}"))
            }
            Err(e) => return Err(e),
        };

        if !success {
            tracing::warn!(tool = tool_name, output = %output, "tool reported an error");
        }

        Ok(ToolCallResult {
            tool_name: tool_name.to_string(),
            success,
            output,
            execution_time_ms: elapsed,
        })
    }

    /// Close every provider connection.
    pub async fn shutdown(&self) {
        lifecycle::shutdown_all(self.providers.values()).await;
    }
}

// ─── CatalogCache ────────────────────────────────────────────────────────────

/// Process-wide cache holding at most one successful discovery.
///
/// Concurrent callers wait on the same discovery; a failed discovery stores
/// nothing, so the next caller discovers again from scratch.
#[derive(Default)]
pub struct CatalogCache {
    cell: OnceCell<Arc<ToolCatalog>>,
}

impl CatalogCache {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Return the cached catalog, discovering it first if needed.
    pub async fn get_or_discover(
        &self,
        configs: &BTreeMap<String, ProviderConfig>,
        policy: DiscoveryPolicy,
        call_timeout: Duration,
    ) -> Result<Arc<ToolCatalog>, McpError> {
        self.cell
            .get_or_try_init(|| async {
                ToolCatalog::discover(configs, policy)
                    .await
                    .map(|catalog| Arc::new(catalog.with_call_timeout(call_timeout)))
            })
            .await
            .cloned()
    }

    /// The cached catalog, if discovery has succeeded.
    pub fn get(&self) -> Option<Arc<ToolCatalog>> {
        self.cell.get().cloned()
    }

    /// Shut down the cached catalog's providers, if any.
    pub async fn shutdown(&self) {
        if let Some(catalog) = self.cell.get() {
            catalog.shutdown().await;
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Provider connection lifecycle.
//!
//! Connects to each configured tool provider (spawning a child process for
//! stdio providers), performs the MCP initialization handshake, pages through
//! `tools/list`, and shuts the connection down again at the end of the
//! session.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::transport::{extract_result, HttpTransport, StdioTransport, Transport};
use super::types::{
    InitializeResult, McpToolDefinition, ProviderConfig, ToolsListResult, MCP_PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake plus the full tool listing.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on `tools/list` pages, guards against a cursor that never ends.
const MAX_LIST_PAGES: usize = 64;

/// Stderr captured from a failed provider is cut to this many bytes.
const MAX_STDERR_BYTES: usize = 2000;

// ─── ConnectedProvider ───────────────────────────────────────────────────────

/// An initialized provider with its transport and advertised tools.
pub struct ConnectedProvider {
    /// Provider name from config (e.g., "figma").
    pub name: String,
    pub transport: Transport,
    /// Tools advertised by `tools/list`, in provider order.
    pub tools: Vec<McpToolDefinition>,
    /// Child process for stdio providers; taken on shutdown.
    process: Mutex<Option<Child>>,
}

impl ConnectedProvider {
    fn new(
        name: &str,
        transport: Transport,
        tools: Vec<McpToolDefinition>,
        process: Option<Child>,
    ) -> Self {
        Self {
            name: name.to_string(),
            transport,
            tools,
            process: Mutex::new(process),
        }
    }

    /// Close the connection. Stdio children get a grace period, then are killed.
    pub async fn shutdown(&self) {
        self.transport.close().await;

        let Some(mut child) = self.process.lock().await.take() else {
            tracing::debug!(provider = %self.name, "provider connection closed");
            return;
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(provider = %self.name, %status, "provider exited");
            }
            _ => {
                tracing::warn!(provider = %self.name, "provider did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
    }
}

// ─── Connecting ──────────────────────────────────────────────────────────────

/// Connect to one provider and fetch its tool list.
pub async fn connect_provider(
    name: &str,
    config: &ProviderConfig,
) -> Result<ConnectedProvider, McpError> {
    tracing::info!(provider = name, transport = config.transport_kind(), "connecting to provider");

    match config {
        ProviderConfig::StreamableHttp { url } => {
            let transport = Transport::Http(HttpTransport::new(name, url)?);
            let tools = match tokio::time::timeout(INIT_TIMEOUT, initialize(&transport, name)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(McpError::InitFailed {
                        name: name.to_string(),
                        reason: format!(
                            "initialization timed out after {}s",
                            INIT_TIMEOUT.as_secs()
                        ),
                    })
                }
            };
            Ok(ConnectedProvider::new(name, transport, tools, None))
        }
        ProviderConfig::Stdio {
            command,
            args,
            env,
            cwd,
        } => {
            let mut cmd = Command::new(command);
            cmd.args(args);
            for (key, value) in env {
                cmd.env(key, value);
            }
            if let Some(dir) = cwd {
                cmd.current_dir(dir);
            }

            #[cfg(target_os = "windows")]
            {
                use std::os::windows::process::CommandExt;
                const CREATE_NO_WINDOW: u32 = 0x08000000;
                cmd.creation_flags(CREATE_NO_WINDOW);
            }

            cmd.stdin(std::process::Stdio::piped());
            cmd.stdout(std::process::Stdio::piped());
            cmd.stderr(std::process::Stdio::piped());
            cmd.kill_on_drop(true);

            let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
                name: name.to_string(),
                reason: format!("{command}: {e}"),
            })?;

            let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
                name: name.to_string(),
                reason: "failed to capture stdin".into(),
            })?;
            let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
                name: name.to_string(),
                reason: "failed to capture stdout".into(),
            })?;
            let stderr_handle = child.stderr.take();

            let transport = Transport::Stdio(StdioTransport::new(name, stdin, stdout));

            let outcome = tokio::time::timeout(INIT_TIMEOUT, initialize(&transport, name)).await;
            let failure = match outcome {
                Ok(Ok(tools)) => {
                    return Ok(ConnectedProvider::new(name, transport, tools, Some(child)))
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("initialization timed out after {}s", INIT_TIMEOUT.as_secs()),
            };

            let _ = child.kill().await;
            let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
            if !stderr_ctx.is_empty() {
                tracing::warn!(provider = name, stderr = %stderr_ctx, "provider stderr captured on failure");
            }
            Err(McpError::InitFailed {
                name: name.to_string(),
                reason: format!("{failure}{}", format_stderr_suffix(&stderr_ctx)),
            })
        }
    }
}

/// Read whatever a failed provider wrote to stderr.
async fn read_stderr_on_failure(stderr_handle: Option<tokio::process::ChildStderr>) -> String {
    use tokio::io::AsyncReadExt;

    let Some(mut stderr) = stderr_handle else {
        return String::new();
    };

    let mut buf = String::new();
    match tokio::time::timeout(Duration::from_millis(500), stderr.read_to_string(&mut buf)).await {
        Ok(Ok(_)) => {
            if buf.len() > MAX_STDERR_BYTES {
                let mut cut = MAX_STDERR_BYTES;
                while !buf.is_char_boundary(cut) {
                    cut -= 1;
                }
                buf.truncate(cut);
                buf.push_str("...(truncated)");
            }
            buf
        }
        _ => String::new(),
    }
}

fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

/// Perform the MCP handshake and list every tool the provider offers.
async fn initialize(
    transport: &Transport,
    provider: &str,
) -> Result<Vec<McpToolDefinition>, McpError> {
    let params = serde_json::json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    });
    let result = extract_result(transport.request("initialize", Some(params)).await?)?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::InitFailed {
            name: provider.to_string(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    tracing::info!(
        provider,
        protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
        server_name = init.server_info.as_ref().and_then(|s| s.name.as_deref()).unwrap_or("unknown"),
        "provider initialized"
    );

    transport.notify("notifications/initialized", None).await?;

    list_tools(transport, provider).await
}

/// Follow `nextCursor` until the provider reports no more pages.
async fn list_tools(
    transport: &Transport,
    provider: &str,
) -> Result<Vec<McpToolDefinition>, McpError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_LIST_PAGES {
        let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
        let result = extract_result(transport.request("tools/list", params).await?)?;
        let page: ToolsListResult =
            serde_json::from_value(result).map_err(|e| McpError::DiscoveryFailed {
                provider: provider.to_string(),
                reason: format!("malformed tools/list result: {e}"),
            })?;

        tools.extend(page.tools);
        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(tools),
        }
    }

    Err(McpError::DiscoveryFailed {
        provider: provider.to_string(),
        reason: format!("tools/list did not finish within {MAX_LIST_PAGES} pages"),
    })
}

// ─── Batch Operations ────────────────────────────────────────────────────────

/// Connect to every configured provider concurrently.
///
/// Results come back in the map's (sorted) order so tool registration is
/// deterministic across runs.
pub async fn connect_all(
    configs: &BTreeMap<String, ProviderConfig>,
) -> Vec<(String, Result<ConnectedProvider, McpError>)> {
    let attempts = configs.iter().map(|(name, config)| async move {
        let result = connect_provider(name, config)
            .await
            .map_err(|e| e.into_discovery(name));
        (name.clone(), result)
    });
    join_all(attempts).await
}

/// Shut down all providers.
pub async fn shutdown_all<'a>(providers: impl IntoIterator<Item = &'a ConnectedProvider>) {
    join_all(providers.into_iter().map(ConnectedProvider::shutdown)).await;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

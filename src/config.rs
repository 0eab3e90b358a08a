//! Application configuration.
//!
//! Loaded from `themeforge.yaml`, found via `THEMEFORGE_CONFIG` or by walking
//! up from the working directory. A missing file yields built-in defaults.
//! `${VAR}` and `${VAR:-default}` are interpolated before parsing, and CLI
//! flags are applied last through [`Overrides`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::orchestrator::OrchestratorConfig;
use crate::agent_core::publisher::CommandPublisher;
use crate::inference::ModelConfig;
use crate::mcp_client::{DiscoveryPolicy, ProviderConfig};

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "themeforge.yaml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "THEMEFORGE_CONFIG";

/// Default design-tool provider (local Figma dev-mode MCP server).
pub const DEFAULT_FIGMA_URL: &str = "http://127.0.0.1:3845/mcp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

// ─── Sections ────────────────────────────────────────────────────────────────

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert(
        "figma".to_string(),
        ProviderConfig::StreamableHttp {
            url: DEFAULT_FIGMA_URL.to_string(),
        },
    );
    providers
}

/// `orchestrator:` section. Durations are whole seconds in the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_tool_rounds: usize,
    pub max_tool_result_chars: usize,
    pub model_call_timeout_secs: u64,
    pub tool_call_timeout_secs: u64,
    pub discovery_policy: DiscoveryPolicy,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            max_tool_rounds: defaults.max_tool_rounds,
            max_tool_result_chars: defaults.max_tool_result_chars,
            model_call_timeout_secs: defaults.model_call_timeout.as_secs(),
            tool_call_timeout_secs: defaults.tool_call_timeout.as_secs(),
            discovery_policy: DiscoveryPolicy::default(),
        }
    }
}

/// `publish:` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub program: String,
    pub verb: Vec<String>,
    pub store: String,
    pub artifact_dir: PathBuf,
    pub fallback_dir: Option<PathBuf>,
    pub enabled: bool,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            program: "shopify".to_string(),
            verb: vec!["theme".to_string(), "push".to_string()],
            store: String::new(),
            artifact_dir: PathBuf::from("theme"),
            fallback_dir: None,
            enabled: true,
        }
    }
}

// ─── AppConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub orchestrator: OrchestratorSection,
    pub publish: PublishSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            providers: default_providers(),
            orchestrator: OrchestratorSection::default(),
            publish: PublishSection::default(),
        }
    }
}

/// CLI values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub store: Option<String>,
    pub artifact_dir: Option<PathBuf>,
    pub no_publish: bool,
}

impl AppConfig {
    /// Parse YAML text after env-var interpolation.
    pub fn from_yaml(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        if interpolated.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Load from `explicit`, else `THEMEFORGE_CONFIG`, else the nearest
    /// `themeforge.yaml`, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .or_else(find_config_file),
        };

        let Some(path) = path else {
            tracing::info!("no {CONFIG_FILE_NAME} found, using built-in defaults");
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw, &path.display().to_string())?;
        tracing::info!(path = %path.display(), providers = config.providers.len(), "config loaded");
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(model) = overrides.model {
            self.model.model = model;
        }
        if let Some(temperature) = overrides.temperature {
            self.model.temperature = temperature;
        }
        if let Some(store) = overrides.store {
            self.publish.store = store;
        }
        if let Some(dir) = overrides.artifact_dir {
            self.publish.artifact_dir = dir;
        }
        if overrides.no_publish {
            self.publish.enabled = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model
            .validate()
            .map_err(|e| invalid(format!("model: {e}")))?;

        if self.providers.is_empty() {
            return Err(invalid("no tool providers configured"));
        }
        for (name, provider) in &self.providers {
            match provider {
                ProviderConfig::StreamableHttp { url } if url.trim().is_empty() => {
                    return Err(invalid(format!("provider '{name}' has an empty url")));
                }
                ProviderConfig::Stdio { command, .. } if command.trim().is_empty() => {
                    return Err(invalid(format!("provider '{name}' has an empty command")));
                }
                _ => {}
            }
        }

        if self.orchestrator.model_call_timeout_secs == 0
            || self.orchestrator.tool_call_timeout_secs == 0
        {
            return Err(invalid("orchestrator timeouts must be at least 1 second"));
        }

        if self.publish.enabled {
            if self.publish.program.trim().is_empty() {
                return Err(invalid("publish.program is empty"));
            }
            if self.publish.store.trim().is_empty() {
                return Err(invalid(
                    "publish.store is empty; set it, pass --store, or use --no-publish",
                ));
            }
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_tool_rounds: self.orchestrator.max_tool_rounds,
            max_tool_result_chars: self.orchestrator.max_tool_result_chars,
            model_call_timeout: Duration::from_secs(self.orchestrator.model_call_timeout_secs),
            tool_call_timeout: Duration::from_secs(self.orchestrator.tool_call_timeout_secs),
            artifact_dir: self.publish.artifact_dir.clone(),
            publish_enabled: self.publish.enabled,
        }
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.tool_call_timeout_secs)
    }

    pub fn publisher(&self) -> CommandPublisher {
        CommandPublisher {
            program: self.publish.program.clone(),
            verb: self.publish.verb.clone(),
            store: self.publish.store.clone(),
            fallback_dir: self.publish.fallback_dir.clone(),
        }
    }
}

/// Walk up from the working directory looking for `themeforge.yaml`.
fn find_config_file() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                result.push_str(&resolve_var_expr(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated; keep verbatim.
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

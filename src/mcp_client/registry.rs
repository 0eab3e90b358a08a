//! Tool registry — aggregates tool definitions across all providers.
//!
//! Provides:
//! - Lookup by the name the model sees
//! - Routing from that name back to `(provider, provider-local name)`
//! - Structural validation of call arguments against the input schema
//! - Serialization into OpenAI function-calling format

use std::collections::{BTreeMap, HashMap};

use super::errors::McpError;
use super::types::{McpToolDefinition, ToolDescriptor};

/// Separator between provider and tool name when two providers clash.
pub const CLASH_SEPARATOR: &str = "__";

// ─── RegisteredTool ──────────────────────────────────────────────────────────

/// One tool as stored in the registry.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    /// Provider that executes the tool.
    pub provider: String,
    /// Name the provider knows the tool by (used in `tools/call`).
    pub remote_name: String,
    pub definition: McpToolDefinition,
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Aggregated, read-only tool registry.
///
/// Tool names are exposed unchanged unless two providers advertise the same
/// name, in which case every clashing entry becomes `provider__tool`.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    /// `exposed_name → tool`. Sorted so listings are deterministic.
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from each provider's advertised tools.
    pub fn from_providers(providers: Vec<(String, Vec<McpToolDefinition>)>) -> Self {
        let mut owners: HashMap<String, usize> = HashMap::new();
        for (_, tools) in &providers {
            for tool in tools {
                *owners.entry(tool.name.clone()).or_default() += 1;
            }
        }

        let mut registry = Self::new();
        for (provider, tools) in providers {
            for definition in tools {
                let clashes = owners.get(&definition.name).copied().unwrap_or(0) > 1;
                let exposed = if clashes {
                    format!("{provider}{CLASH_SEPARATOR}{}", definition.name)
                } else {
                    definition.name.clone()
                };
                if registry.tools.contains_key(&exposed) {
                    tracing::warn!(
                        provider = %provider,
                        tool = %exposed,
                        "provider advertised a tool twice, keeping the first"
                    );
                    continue;
                }
                registry.tools.insert(
                    exposed,
                    RegisteredTool {
                        provider: provider.clone(),
                        remote_name: definition.name.clone(),
                        definition,
                    },
                );
            }
        }
        registry
    }

    /// Look up a tool by its exposed name.
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Return all exposed tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Count tools belonging to a specific provider.
    pub fn tools_for_provider(&self, provider: &str) -> usize {
        self.tools.values().filter(|t| t.provider == provider).count()
    }

    /// Validate a tool call: tool exists and required fields are present.
    ///
    /// This is a structural check only. Full JSON Schema validation is left to
    /// the provider.
    pub fn validate_tool_call(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<&RegisteredTool, McpError> {
        let tool = self.get(tool_name).ok_or(McpError::UnknownTool {
            name: tool_name.to_string(),
        })?;

        let Some(args) = arguments.as_object() else {
            return Err(McpError::InvalidArguments {
                tool: tool_name.to_string(),
                reason: "arguments must be a JSON object".into(),
            });
        };

        if let Some(required) = tool
            .definition
            .input_schema
            .get("required")
            .and_then(|r| r.as_array())
        {
            for field_name in required.iter().filter_map(|f| f.as_str()) {
                if !args.contains_key(field_name) {
                    return Err(McpError::InvalidArguments {
                        tool: tool_name.to_string(),
                        reason: format!("missing required field: '{field_name}'"),
                    });
                }
            }
        }

        Ok(tool)
    }

    /// Descriptors for every tool, in name order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|(name, tool)| ToolDescriptor {
                name: name.clone(),
                description: tool.definition.description.clone(),
                input_schema: schema_or_empty_object(&tool.definition.input_schema),
                provider: tool.provider.clone(),
            })
            .collect()
    }
}

/// Providers may omit the schema; the model API requires an object schema.
fn schema_or_empty_object(schema: &serde_json::Value) -> serde_json::Value {
    if schema.is_object() {
        schema.clone()
    } else {
        serde_json::json!({ "type": "object", "properties": {} })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool(name: &str) -> McpToolDefinition {
        McpToolDefinition {
            name: name.to_string(),
            description: format!("Test tool: {name}"),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" }
                },
                "required": ["nodeId"]
            }),
        }
    }

    fn figma_registry() -> ToolRegistry {
        ToolRegistry::from_providers(vec![(
            "figma".into(),
            vec![sample_tool("get_code"), sample_tool("get_image")],
        )])
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = figma_registry();
        assert_eq!(registry.len(), 2);
        let tool = registry.get("get_code").unwrap();
        assert_eq!(tool.provider, "figma");
        assert_eq!(tool.remote_name, "get_code");
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_name_clash_is_prefixed() {
        let registry = ToolRegistry::from_providers(vec![
            ("figma".into(), vec![sample_tool("get_code"), sample_tool("get_image")]),
            ("local".into(), vec![sample_tool("get_code")]),
        ]);

        assert_eq!(
            registry.tool_names(),
            vec!["figma__get_code", "get_image", "local__get_code"]
        );
        let local = registry.get("local__get_code").unwrap();
        assert_eq!(local.provider, "local");
        assert_eq!(local.remote_name, "get_code");
        assert_eq!(registry.tools_for_provider("figma"), 2);
    }

    #[test]
    fn test_duplicate_within_provider_keeps_first() {
        let mut second = sample_tool("get_code");
        second.description = "second".into();
        let registry = ToolRegistry::from_providers(vec![(
            "figma".into(),
            vec![sample_tool("get_code"), second],
        )]);
        // Both count as the same owner, so the name clashes with itself.
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("figma__get_code").unwrap().definition.description,
            "Test tool: get_code"
        );
    }

    #[test]
    fn test_validate_tool_call_valid() {
        let registry = figma_registry();
        let args = serde_json::json!({"nodeId": "1:2"});
        let tool = registry.validate_tool_call("get_code", &args).unwrap();
        assert_eq!(tool.remote_name, "get_code");
    }

    #[test]
    fn test_validate_tool_call_missing_required() {
        let registry = figma_registry();
        let err = registry
            .validate_tool_call("get_code", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { .. }));
        assert!(err.to_string().contains("nodeId"));
    }

    #[test]
    fn test_validate_tool_call_non_object_arguments() {
        let registry = figma_registry();
        let err = registry
            .validate_tool_call("get_code", &serde_json::json!("1:2"))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidArguments { .. }));
    }

    #[test]
    fn test_validate_tool_call_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .validate_tool_call("get_code", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, McpError::UnknownTool { .. }));
    }

    #[test]
    fn test_descriptors_fill_missing_schema() {
        let mut bare = sample_tool("get_metadata");
        bare.input_schema = serde_json::Value::Null;
        let registry = ToolRegistry::from_providers(vec![("figma".into(), vec![bare])]);

        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "get_metadata");
        assert_eq!(descriptors[0].provider, "figma");
        assert_eq!(descriptors[0].input_schema["type"], "object");
    }
}

//! ArtifactSynthesizer — turns the model's design text into theme files.
//!
//! Pipeline:
//! 1. Embed the source text in a synthesis prompt describing the output shape
//! 2. Ask the model in tool-blind mode
//! 3. Strip a wrapping code fence (line-anchored, first and last line only)
//! 4. Parse a JSON object of `path → content`
//! 5. Inject the required layout and settings entries when missing
//!
//! Persistence is the publisher's job.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::errors::SynthesisError;
use super::gateway::ModelGateway;
use super::types::{ArtifactBundle, LAYOUT_PATH, SETTINGS_PATH};

// ─── Defaults ───────────────────────────────────────────────────────────────

/// Author recorded in the default settings schema.
pub const DEFAULT_THEME_AUTHOR: &str = "ThemeForge";

/// Layout skeleton used when the model omits `layout/theme.liquid`.
pub const DEFAULT_LAYOUT: &str = "\
<!DOCTYPE html>
<html lang=\"{{ request.locale.iso_code }}\">
<head>
  <meta charset=\"utf-8\">
  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">
  <title>{{ page_title }}</title>
  {{ content_for_header }}
  {{ 'style.css' | asset_url | stylesheet_tag }}
</head>
<body>
  {{ content_for_layout }}
  <script src=\"{{ 'script.js' | asset_url }}\" defer></script>
</body>
</html>
";

/// Settings schema used when the model omits `config/settings_schema.json`.
pub fn default_settings_schema() -> String {
    serde_json::json!([{
        "name": "theme_info",
        "theme_name": "Generated Theme",
        "theme_version": "1.0.0",
        "theme_author": DEFAULT_THEME_AUTHOR,
    }])
    .to_string()
}

// ─── Prompt ─────────────────────────────────────────────────────────────────

/// Build the tool-blind synthesis prompt around `source`.
pub fn build_prompt(source: &str) -> String {
    format!(
        "You are a Shopify theme generator.\n\
         The following is React/JSX code or structured UI markup:\n\
         \n\
         ---\n\
         {source}\n\
         ---\n\
         \n\
         Convert it into a Shopify theme:\n\
         - Liquid templates in `layout/`, `sections/` and `snippets/`.\n\
         - Theme settings in `config/settings_schema.json`.\n\
         - All CSS and JavaScript in `assets/`.\n\
         \n\
         Return ONLY a JSON object mapping each file path to its full contents as a string:\n\
         {{\n\
         \x20 \"layout/theme.liquid\": \"...\",\n\
         \x20 \"sections/header.liquid\": \"...\",\n\
         \x20 \"sections/footer.liquid\": \"...\",\n\
         \x20 \"config/settings_schema.json\": \"...\",\n\
         \x20 \"assets/style.css\": \"...\",\n\
         \x20 \"assets/script.js\": \"...\"\n\
         }}\n"
    )
}

// ─── Parsing ────────────────────────────────────────────────────────────────

fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn is_closing_fence(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 3 && line.chars().all(|c| c == '`')
}

/// Remove a fence line at the very start and a closing fence at the very end.
///
/// Models sometimes nest the reply in more than one fence (a bare fence
/// around a `json` fence). Outer layers are peeled one pass at a time until
/// the edges hold no fence, so the result never starts or ends with a fence
/// line and stripping it again is a no-op. Fences inside the content are
/// left alone.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    loop {
        let before = body;

        if let Some(first) = body.lines().next() {
            if is_fence_line(first) {
                body = match body.find('\n') {
                    Some(pos) => &body[pos + 1..],
                    None => "",
                };
            }
        }

        if let Some(pos) = body.rfind('\n') {
            if is_closing_fence(&body[pos + 1..]) {
                body = &body[..pos];
            }
        } else if is_closing_fence(body) {
            body = "";
        }

        body = body.trim();
        if body.len() == before.len() {
            return body;
        }
    }
}

/// Parse a synthesis reply into a bundle, without defaults.
///
/// Non-string values are kept as pretty-printed JSON text so a settings
/// schema returned as an array still lands on disk as valid JSON.
pub fn parse_bundle(raw: &str) -> Result<BTreeMap<String, String>, SynthesisError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(SynthesisError::Parse {
            reason: "response is empty after removing code fences".into(),
            raw: raw.to_string(),
        });
    }

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| SynthesisError::Parse {
            reason: e.to_string(),
            raw: raw.to_string(),
        })?;

    let serde_json::Value::Object(entries) = value else {
        return Err(SynthesisError::Parse {
            reason: format!(
                "expected a JSON object of file paths, got {}",
                json_kind(&value)
            ),
            raw: raw.to_string(),
        });
    };

    Ok(entries
        .into_iter()
        .map(|(path, content)| {
            let text = match content {
                serde_json::Value::String(s) => s,
                other => {
                    serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string())
                }
            };
            (path, text)
        })
        .collect())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Add the required entries that are missing. Never overwrites.
pub fn apply_defaults(mut entries: BTreeMap<String, String>) -> ArtifactBundle {
    if !entries.contains_key(SETTINGS_PATH) {
        tracing::info!(path = SETTINGS_PATH, "injecting default settings schema");
        entries.insert(SETTINGS_PATH.to_string(), default_settings_schema());
    }
    if !entries.contains_key(LAYOUT_PATH) {
        tracing::info!(path = LAYOUT_PATH, "injecting default layout");
        entries.insert(LAYOUT_PATH.to_string(), DEFAULT_LAYOUT.to_string());
    }
    ArtifactBundle::from(entries)
}

// ─── ArtifactSynthesizer ────────────────────────────────────────────────────

pub struct ArtifactSynthesizer {
    gateway: Arc<dyn ModelGateway>,
}

impl ArtifactSynthesizer {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Derive a bundle from the model's design text.
    pub async fn synthesize(&self, source_text: &str) -> Result<ArtifactBundle, SynthesisError> {
        let source = source_text.trim();
        if source.is_empty() {
            return Err(SynthesisError::EmptySource);
        }

        tracing::info!(source_len = source.len(), "=== SYNTHESIS REQUEST ===");
        let reply = self.gateway.complete(&build_prompt(source)).await?;
        tracing::debug!(reply_len = reply.len(), "synthesis reply received");

        let entries = parse_bundle(&reply).map_err(|e| {
            if let SynthesisError::Parse { reason, raw } = &e {
                tracing::warn!(reason = %reason, raw = %raw, "synthesis reply did not parse");
            }
            e
        })?;

        let bundle = apply_defaults(entries);
        tracing::info!(files = bundle.len(), "=== SYNTHESIS COMPLETE ===");
        Ok(bundle)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let wrapped = "```json\n{\"a.liquid\":\"x\"}\n```";
        assert_eq!(strip_code_fence(wrapped), "{\"a.liquid\":\"x\"}");
    }

    #[test]
    fn test_strip_nested_fence_layers() {
        assert_eq!(strip_code_fence("```\n```js\ninner\n```\n```"), "inner");
        assert_eq!(
            strip_code_fence("```\n```json\n{\"a.liquid\":\"x\"}\n```\n```"),
            "{\"a.liquid\":\"x\"}"
        );
    }

    #[test]
    fn test_strip_is_idempotent() {
        for text in [
            "```json\n{\"a\":\"b\"}\n```",
            "```\n```js\ninner\n```\n```",
            "{\"a\":\"```\"}",
            "  plain  ",
            "```",
            "",
        ] {
            let once = strip_code_fence(text);
            assert_eq!(strip_code_fence(once), once, "not idempotent for {text:?}");
        }
    }

    #[test]
    fn test_strip_leaves_inner_fences() {
        let text = "```json\n{\"README.md\": \"use:\\n```\\ncode\\n```\"}\n```";
        assert_eq!(
            strip_code_fence(text),
            "{\"README.md\": \"use:\\n```\\ncode\\n```\"}"
        );
        let multiline = "{\n\"a\": 1,\n```\n\"b\": 2\n}";
        assert_eq!(strip_code_fence(multiline), multiline);
    }

    #[test]
    fn test_parse_whitespace_is_error() {
        assert!(matches!(parse_bundle("   "), Err(SynthesisError::Parse { .. })));
        assert!(matches!(
            parse_bundle("```json\n   \n```"),
            Err(SynthesisError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_invalid_json_keeps_raw() {
        match parse_bundle("Sure! Here are your files.") {
            Err(SynthesisError::Parse { raw, .. }) => assert_eq!(raw, "Sure! Here are your files."),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_non_object_is_error() {
        match parse_bundle("[1, 2]") {
            Err(SynthesisError::Parse { reason, .. }) => assert!(reason.contains("an array")),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_non_string_values_are_pretty_printed() {
        let entries =
            parse_bundle(r#"{"config/settings_schema.json": [{"name": "theme_info"}]}"#).unwrap();
        let text = &entries["config/settings_schema.json"];
        let back: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(back[0]["name"], "theme_info");
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_defaults_added_when_missing() {
        let entries = parse_bundle(r#"{"assets/style.css": "body{}"}"#).unwrap();
        let bundle = apply_defaults(entries);
        assert_eq!(
            bundle.paths().collect::<Vec<_>>(),
            vec!["assets/style.css", SETTINGS_PATH, LAYOUT_PATH]
        );
        assert_eq!(bundle.get("assets/style.css"), Some("body{}"));
        assert_eq!(bundle.get(LAYOUT_PATH), Some(DEFAULT_LAYOUT));
        let schema: serde_json::Value =
            serde_json::from_str(bundle.get(SETTINGS_PATH).unwrap()).unwrap();
        assert_eq!(schema[0]["theme_author"], DEFAULT_THEME_AUTHOR);
    }

    #[test]
    fn test_defaults_never_overwrite() {
        let mut entries = BTreeMap::new();
        entries.insert(SETTINGS_PATH.to_string(), "X".to_string());
        entries.insert(LAYOUT_PATH.to_string(), "Y".to_string());
        let bundle = apply_defaults(entries);
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get(SETTINGS_PATH), Some("X"));
        assert_eq!(bundle.get(LAYOUT_PATH), Some("Y"));
    }

    #[test]
    fn test_default_layout_references_assets() {
        assert!(DEFAULT_LAYOUT.contains("content_for_header"));
        assert!(DEFAULT_LAYOUT.contains("content_for_layout"));
        assert!(DEFAULT_LAYOUT.contains("'style.css'"));
        assert!(DEFAULT_LAYOUT.contains("'script.js'"));
    }

    #[test]
    fn test_prompt_embeds_source_verbatim() {
        let prompt = build_prompt("const Hero = () => <h1>{title}</h1>;");
        assert!(prompt.contains("const Hero = () => <h1>{title}</h1>;"));
        assert!(prompt.contains("\"layout/theme.liquid\""));
        assert!(prompt.contains("config/settings_schema.json"));
    }
}

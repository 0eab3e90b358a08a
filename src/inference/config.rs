//! Model endpoint configuration.
//!
//! The `model:` section of `themeforge.yaml`. Every field has a default so an
//! empty section (or no config file at all) still yields a usable client as
//! long as `OPENAI_API_KEY` is set.

use serde::Deserialize;

use super::errors::InferenceError;

// ─── Defaults ────────────────────────────────────────────────────────────────

/// Model used when neither the config file nor the CLI names one.
pub const DEFAULT_MODEL: &str = "moonshotai/kimi-k2:free";

/// Endpoint used when `OPENAI_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_api_key() -> String {
    std::env::var("OPENAI_API_KEY").unwrap_or_default()
}
fn default_base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}
fn default_request_timeout_secs() -> u64 {
    180
}
fn default_max_retries() -> u32 {
    2
}

// ─── ModelConfig ─────────────────────────────────────────────────────────────

/// A single model endpoint's runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent in the request body.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature, validated to `[0, 2]`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Bearer credential. Empty means no `Authorization` header.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Endpoint root, e.g. `https://openrouter.ai/api/v1`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Total HTTP timeout for one completion request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra attempts for transient failures (connect, timeout, 429, 5xx).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            api_key: default_api_key(),
            base_url: default_base_url(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ModelConfig {
    /// Reject configurations the endpoint would refuse anyway.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.model.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "model identifier is empty".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(InferenceError::ConfigError {
                reason: format!(
                    "temperature {} is outside the supported range [0, 2]",
                    self.temperature
                ),
            });
        }
        if self.base_url.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "base_url is empty".into(),
            });
        }
        Ok(())
    }

    /// `{base_url}/chat/completions`, tolerating a trailing slash.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config: ModelConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_retries, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        let config = ModelConfig {
            temperature: 2.5,
            ..ModelConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("temperature"));

        let config = ModelConfig {
            temperature: -0.1,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_temperature_bounds_accepted() {
        for t in [0.0, 2.0] {
            let config = ModelConfig {
                temperature: t,
                ..ModelConfig::default()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_empty_model_rejected() {
        let config = ModelConfig {
            model: "  ".into(),
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_completions_url_trims_trailing_slash() {
        let config = ModelConfig {
            base_url: "http://localhost:11434/v1/".into(),
            ..ModelConfig::default()
        };
        assert_eq!(
            config.completions_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }
}

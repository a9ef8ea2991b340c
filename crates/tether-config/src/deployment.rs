use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use url::Url;

/// Model name sent when none is configured
pub const DEFAULT_MODEL: &str = "odsc-llm";
/// Sampling temperature sent when none is configured
pub const DEFAULT_TEMPERATURE: f64 = 0.01;
/// Maximum number of generated tokens
pub const DEFAULT_MAX_TOKENS: u32 = 512;
/// Context window advertised in model metadata
pub const DEFAULT_CONTEXT_WINDOW: u32 = 3900;
/// Retries attempted by the HTTP transport on transient failures
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Base of the exponential backoff, in seconds
pub const DEFAULT_BACKOFF_FACTOR: f64 = 0.5;
/// Per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection and generation settings for a model deployment endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    /// Prediction endpoint (e.g. `https://host/deployment/predict`)
    pub endpoint: Url,
    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Model name placed in the request body
    #[serde(default = "default_model")]
    pub model: String,
    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Default maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout (e.g. "30s", "2m")
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Retries on connection errors and retryable statuses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff factor in seconds; attempt `n` sleeps `factor * 2^n`
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Context window advertised to callers
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    /// Whether the deployment serves a chat model
    #[serde(default = "default_true")]
    pub is_chat_model: bool,
    /// Whether the deployment supports tool calling
    #[serde(default = "default_true")]
    pub is_function_calling_model: bool,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Extra body parameters merged into every request (e.g. `top_k`)
    #[serde(default)]
    pub additional_kwargs: serde_json::Map<String, serde_json::Value>,
}

impl DeploymentConfig {
    /// Build a configuration with defaults for everything but the endpoint
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            api_key: None,
            model: default_model(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            context_window: DEFAULT_CONTEXT_WINDOW,
            is_chat_model: true,
            is_function_calling_model: true,
            headers: BTreeMap::new(),
            additional_kwargs: serde_json::Map::new(),
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns an error describing the first out-of-range setting
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("deployment.temperature must be between 0.0 and 2.0, got {}", self.temperature);
        }
        if self.max_tokens == 0 {
            anyhow::bail!("deployment.max_tokens must be greater than 0");
        }
        if self.backoff_factor < 0.0 || !self.backoff_factor.is_finite() {
            anyhow::bail!("deployment.backoff_factor must be a non-negative number");
        }
        if self.timeout.is_zero() {
            anyhow::bail!("deployment.timeout must be greater than 0");
        }
        Ok(())
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(serde::de::Error::custom)
}

fn default_model() -> String {
    DEFAULT_MODEL.to_owned()
}

const fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

const fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_backoff_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}

const fn default_context_window() -> u32 {
    DEFAULT_CONTEXT_WINDOW
}

const fn default_true() -> bool {
    true
}

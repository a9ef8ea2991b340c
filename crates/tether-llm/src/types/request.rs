use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};

/// Parameters controlling text generation
///
/// Unset values fall back to the client's configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Random seed for deterministic generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Backend-specific body parameters; these override configured ones
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// Text completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Prompt text
    pub prompt: String,
    /// Generation parameters
    #[serde(default)]
    pub params: GenerationParams,
}

impl CompletionRequest {
    /// Request with default parameters
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            params: GenerationParams::default(),
        }
    }
}

/// Chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation messages, oldest first
    pub messages: Vec<Message>,
    /// Generation parameters
    #[serde(default)]
    pub params: GenerationParams,
    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Keep every tool call of the response instead of only the first
    #[serde(default)]
    pub allow_parallel_tool_calls: bool,
}

impl ChatRequest {
    /// Request with default parameters and no tools
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            params: GenerationParams::default(),
            tools: Vec::new(),
            tool_choice: None,
            allow_parallel_tool_calls: false,
        }
    }
}

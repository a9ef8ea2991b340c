//! Deployment `/predict` wire format types
//!
//! Every field is optional so that decoding never fails on shape alone;
//! [`crate::payload`] decides which absences are errors.

use serde::{Deserialize, Serialize};

// -- Response types --

/// Token usage block
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

/// Text completion response or streaming chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireCompletion {
    #[serde(default)]
    pub choices: Option<Vec<WireCompletionChoice>>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

/// One completion choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireCompletionChoice {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub logprobs: Option<serde_json::Value>,
}

/// Chat completion response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireChat {
    #[serde(default)]
    pub choices: Option<Vec<WireChatChoice>>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

/// One chat choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireChatChoice {
    #[serde(default)]
    pub message: Option<WireMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub logprobs: Option<serde_json::Value>,
}

/// Chat message, used both in requests and responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// `null` is serialized for assistant messages that only carry tool calls
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Complete tool call on a message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    pub function: WireFunctionCall,
}

/// Function name and JSON-encoded arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Streaming chat chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireChatChunk {
    #[serde(default)]
    pub choices: Option<Vec<WireChatChunkChoice>>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

/// One streaming chat choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireChatChunkChoice {
    #[serde(default)]
    pub delta: Option<WireDelta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental message content
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCallDelta>>,
}

/// Fragment of a tool call within a streaming delta
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireToolCallDelta {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<WireFunctionDelta>,
}

/// Partial function data within a tool-call fragment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

// -- Request types --

/// Tool definition in the backend's function-schema shape
#[derive(Debug, Clone, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: WireFunction,
}

/// Function specification inside a [`WireTool`]
#[derive(Debug, Clone, Serialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

fn function_type() -> String {
    "function".to_owned()
}

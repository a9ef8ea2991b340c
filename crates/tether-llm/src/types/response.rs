use serde::{Deserialize, Serialize};

use super::message::Message;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the `max_tokens` limit
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
}

impl FinishReason {
    /// Parse a backend finish reason; unknown values are dropped
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stop" | "eos" | "end_turn" => Some(Self::Stop),
            "length" | "max_tokens" => Some(Self::Length),
            "tool_calls" | "function_call" | "tool_use" => Some(Self::ToolCalls),
            "content_filter" => Some(Self::ContentFilter),
            _ => None,
        }
    }
}

/// Token usage reported by the backend
///
/// Each counter is `None` when the backend did not report it, which is not
/// the same as reporting zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    /// Tokens generated in the completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    /// Total tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl Usage {
    /// Whether no counter was reported
    pub const fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none() && self.total_tokens.is_none()
    }
}

/// One candidate token and its log-probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogProb {
    /// Token text
    pub token: String,
    /// Natural-log probability
    pub logprob: f64,
}

/// Log-probability information for one generated position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLogProb {
    /// Token that was generated
    pub token: String,
    /// Its log-probability, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprob: Option<f64>,
    /// Most likely alternatives at this position
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top: Vec<LogProb>,
}

/// Terminal result of a completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Full generated text
    pub text: String,
    /// Token usage, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Per-token log-probabilities, when requested and reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<TokenLogProb>>,
    /// Backend payload this response was built from
    pub raw: serde_json::Value,
}

/// Terminal result of a chat call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Assistant message, including any raw tool calls
    pub message: Message,
    /// Token usage, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Per-token log-probabilities, when requested and reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<TokenLogProb>>,
    /// Backend payload this response was built from
    pub raw: serde_json::Value,
}

/// One step of a streaming completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionDelta {
    /// Text accumulated so far, including this step
    pub text: String,
    /// Fragment introduced by this step (may be empty)
    pub delta: String,
    /// Token usage carried by this chunk, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Finish reason carried by this chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Chunk this step was built from
    pub raw: serde_json::Value,
}

/// One step of a streaming chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    /// Message accumulated so far, including this step
    pub message: Message,
    /// Content fragment introduced by this step (may be empty)
    pub delta: String,
    /// Token usage carried by this chunk, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Finish reason carried by this chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Chunk this step was built from
    pub raw: serde_json::Value,
}

//! Canonical request/response types
//!
//! Backend payloads are decoded into these at the boundary; nothing past
//! [`crate::payload`] touches raw JSON except to keep it for inspection.

pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use message::{FunctionCall, Message, MessageToolCall, Role};
pub use request::{ChatRequest, CompletionRequest, GenerationParams};
pub use response::{
    ChatDelta, ChatResponse, CompletionDelta, CompletionResponse, FinishReason, LogProb, TokenLogProb, Usage,
};
pub use tool::{FunctionDefinition, ToolCall, ToolChoice, ToolChoiceMode, ToolDefinition};

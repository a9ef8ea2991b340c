//! Client for managed model deployments
//!
//! Talks to a single `/predict`-style endpoint that accepts either a `prompt`
//! body (text completion) or a `messages` body (chat), and normalizes its
//! terminal and streaming payloads into one response model.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod body;
pub mod client;
pub mod error;
pub mod normalize;
pub mod payload;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod types;

pub use client::{BlockingDeploymentClient, DeltaIter, DeltaStream, DeploymentClient, ModelMetadata};
pub use error::LlmError;
pub use normalize::{Accumulate, ChatAccumulator, CompletionAccumulator, Deltas, normalize_chat, normalize_completion, normalize_stream};
pub use tools::{ToolOptions, extract_tool_calls, force_single_tool_call, prepare_chat_with_tools, resolve_tool_choice};
pub use transport::{BlockingHttpTransport, BlockingTransport, HttpTransport, RetryPolicy, Transport, TransportError};
pub use types::*;

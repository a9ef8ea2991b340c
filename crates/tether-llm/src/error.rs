use thiserror::Error;

use crate::transport::TransportError;

/// Errors produced while building requests or normalizing backend output
#[derive(Debug, Error)]
pub enum LlmError {
    /// Backend payload is missing a required field or has the wrong shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A tool call carried an argument string that is not a JSON object
    #[error("failed to parse arguments for tool `{tool}`: {source}")]
    ToolArgumentParse {
        /// Name of the tool whose arguments failed to parse
        tool: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Tool calls were required but the response carried none
    #[error("expected at least one tool call in the response")]
    NoToolCall,

    /// Caller supplied a request that cannot be sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Failure raised by the transport, passed through unchanged
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl LlmError {
    /// Shorthand for an [`LlmError::InvalidResponse`]
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Whether retrying the same call could succeed
    ///
    /// Only transient transport failures qualify; malformed payloads are
    /// deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

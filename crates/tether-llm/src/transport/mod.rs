//! Transport collaborators that move JSON bodies to and from a deployment
//!
//! The clients only ever see raw JSON values; retries, authentication and
//! SSE framing live behind these traits.

pub mod blocking;
pub mod http;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use thiserror::Error;

pub use self::blocking::BlockingHttpTransport;
pub use self::http::{HttpTransport, RetryPolicy};

/// Stream of raw response chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Value, TransportError>> + Send>>;

/// Blocking iterator of raw response chunks
pub type ChunkIter = Box<dyn Iterator<Item = Result<Value, TransportError>> + Send>;

/// Errors raised while talking to the deployment
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, timeout or body read failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("deployment returned {status}: {body}")]
    Status {
        /// HTTP status returned by the deployment
        status: reqwest::StatusCode,
        /// Response body, for diagnostics
        body: String,
    },

    /// SSE framing error mid-stream
    #[error("stream error: {0}")]
    Stream(String),

    /// Response body or SSE event was not valid JSON
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The blocking runtime could not be built
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl TransportError {
    /// Whether the failure is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_timeout(),
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Stream(_) | Self::Decode(_) | Self::Runtime(_) => false,
        }
    }
}

/// Statuses retried by the HTTP transport
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Asynchronous transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the full JSON response
    async fn send(&self, body: &Value) -> Result<Value, TransportError>;

    /// Send one streaming request and return its chunks
    async fn send_stream(&self, body: &Value) -> Result<ChunkStream, TransportError>;
}

/// Blocking transport
///
/// Must not be called from inside an async runtime.
pub trait BlockingTransport: Send + Sync {
    /// Send one request and return the full JSON response
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the request fails.
    fn send(&self, body: &Value) -> Result<Value, TransportError>;

    /// Send one streaming request and return its chunks
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the request cannot be started.
    fn send_stream(&self, body: &Value) -> Result<ChunkIter, TransportError>;
}

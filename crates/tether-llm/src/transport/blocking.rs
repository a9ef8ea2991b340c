//! Blocking HTTP transport driven by a private current-thread runtime

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tether_config::DeploymentConfig;
use tokio::runtime::{Builder, Runtime};

use super::{BlockingTransport, ChunkIter, ChunkStream, HttpTransport, Transport, TransportError};

/// Blocking wrapper around [`HttpTransport`]
///
/// Owns its own runtime, so it must be used from a plain thread, never from
/// inside an async context.
pub struct BlockingHttpTransport {
    runtime: Arc<Runtime>,
    inner: HttpTransport,
}

impl BlockingHttpTransport {
    /// Build from deployment configuration
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the runtime or the HTTP client cannot be
    /// built.
    pub fn from_config(config: &DeploymentConfig) -> Result<Self, TransportError> {
        Self::new(HttpTransport::from_config(config)?)
    }

    /// Wrap an existing async transport
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Runtime`] if the runtime cannot be built.
    pub fn new(inner: HttpTransport) -> Result<Self, TransportError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;

        Ok(Self {
            runtime: Arc::new(runtime),
            inner,
        })
    }
}

impl BlockingTransport for BlockingHttpTransport {
    fn send(&self, body: &Value) -> Result<Value, TransportError> {
        self.runtime.block_on(self.inner.send(body))
    }

    fn send_stream(&self, body: &Value) -> Result<ChunkIter, TransportError> {
        let stream = self.runtime.block_on(self.inner.send_stream(body))?;

        Ok(Box::new(BlockingChunks {
            runtime: Arc::clone(&self.runtime),
            stream,
        }))
    }
}

/// Pulls one chunk per `next` by blocking on the stream
struct BlockingChunks {
    runtime: Arc<Runtime>,
    stream: ChunkStream,
}

impl Iterator for BlockingChunks {
    type Item = Result<Value, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}

//! HTTP transport for a deployment `/predict` endpoint

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{StreamExt, future};
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tether_config::DeploymentConfig;
use url::Url;

use super::{ChunkStream, Transport, TransportError};

/// SSE payload that ends a stream
const DONE_MARKER: &str = "[DONE]";

/// Upper bound on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Retry settings for transient failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Attempt `n` (zero-based) sleeps `backoff_factor * 2^n` seconds, capped
    /// at two minutes
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let secs = self.backoff_factor * 2f64.powf(f64::from(attempt));
        Duration::try_from_secs_f64(secs).map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }
}

impl From<&DeploymentConfig> for RetryPolicy {
    fn from(config: &DeploymentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
        }
    }
}

/// `reqwest`-backed transport with bearer auth and retries
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    api_key: Option<SecretString>,
    headers: HeaderMap,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Build from deployment configuration
    ///
    /// Headers with an invalid name or value are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn from_config(config: &DeploymentConfig) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            headers: parse_headers(config.headers.iter()),
            retry: RetryPolicy::from(config),
        })
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Endpoint requests are posted to
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, body: &Value, stream: bool) -> RequestBuilder {
        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(body);

        if stream {
            builder = builder.header(ACCEPT, "text/event-stream");
        }
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        builder
    }

    /// Post `body`, retrying transient failures
    async fn execute(&self, body: &Value, stream: bool) -> Result<Response, TransportError> {
        let mut attempt = 0;

        loop {
            let error = match self.request(body, stream).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    TransportError::Status { status, body }
                }
                Err(e) => TransportError::Request(e),
            };

            if attempt >= self.retry.max_retries || !error.is_retryable() {
                tracing::warn!(endpoint = %self.endpoint, attempt, error = %error, "deployment request failed");
                return Err(error);
            }

            let delay = self.retry.delay(attempt);
            tracing::debug!(
                endpoint = %self.endpoint,
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "retrying deployment request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, body: &Value) -> Result<Value, TransportError> {
        let bytes = self.execute(body, false).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn send_stream(&self, body: &Value) -> Result<ChunkStream, TransportError> {
        let response = self.execute(body, true).await?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| future::ready(!matches!(event, Ok(e) if e.data.trim() == DONE_MARKER)))
            .filter(|event| future::ready(!matches!(event, Ok(e) if e.data.trim().is_empty())))
            .map(|event| match event {
                Ok(event) => serde_json::from_str::<Value>(event.data.trim())
                    .map_err(|e| TransportError::Decode(format!("{e}: {}", event.data))),
                Err(e) => Err(TransportError::Stream(e.to_string())),
            });

        Ok(Box::pin(chunks))
    }
}

fn parse_headers<'a>(headers: impl Iterator<Item = (&'a String, &'a String)>) -> HeaderMap {
    headers
        .filter_map(|(name, value)| {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                tracing::warn!(header = %name, "skipping invalid header name");
                return None;
            };
            let Ok(value) = HeaderValue::from_str(value) else {
                tracing::warn!(header = %name, "skipping invalid header value");
                return None;
            };
            Some((name, value))
        })
        .collect()
}

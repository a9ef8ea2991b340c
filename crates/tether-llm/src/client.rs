//! Deployment clients
//!
//! Both clients share request building and normalization; they differ only
//! in whether the transport is awaited or blocked on.

use std::pin::Pin;
use std::time::Instant;

use futures_util::Stream;
use serde_json::Value;
use tether_config::DeploymentConfig;
use tether_telemetry::metrics;

use crate::body::ModelSettings;
use crate::error::LlmError;
use crate::normalize::{ChatAccumulator, CompletionAccumulator, Deltas, normalize_chat, normalize_completion, normalize_stream};
use crate::tools::{ToolOptions, force_single_tool_call, prepare_chat_with_tools};
use crate::transport::{BlockingHttpTransport, BlockingTransport, HttpTransport, Transport};
use crate::types::{
    ChatDelta, ChatRequest, ChatResponse, CompletionDelta, CompletionRequest, CompletionResponse, Message,
    ToolDefinition, Usage,
};

/// Lazy stream of deltas
pub type DeltaStream<D> = Pin<Box<dyn Stream<Item = Result<D, LlmError>> + Send>>;

/// Lazy blocking iterator of deltas
pub type DeltaIter<D> = Box<dyn Iterator<Item = Result<D, LlmError>> + Send>;

/// Static facts about the deployed model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    pub context_window: u32,
    /// Maximum tokens generated per call
    pub num_output: u32,
    pub is_chat_model: bool,
    pub is_function_calling_model: bool,
    pub model_name: String,
}

impl From<&DeploymentConfig> for ModelMetadata {
    fn from(config: &DeploymentConfig) -> Self {
        Self {
            context_window: config.context_window,
            num_output: config.max_tokens,
            is_chat_model: config.is_chat_model,
            is_function_calling_model: config.is_function_calling_model,
            model_name: config.model.clone(),
        }
    }
}

/// Request building and response post-processing shared by both clients
#[derive(Debug, Clone)]
struct Core {
    settings: ModelSettings,
    metadata: ModelMetadata,
}

impl Core {
    fn new(config: &DeploymentConfig) -> Self {
        Self {
            settings: ModelSettings::from(config),
            metadata: ModelMetadata::from(config),
        }
    }

    fn chat_with_tools_request(
        tools: &[ToolDefinition],
        user_msg: Message,
        chat_history: Vec<Message>,
        options: &ToolOptions,
    ) -> Result<ChatRequest, LlmError> {
        if tools.is_empty() {
            return Err(LlmError::InvalidRequest("no tools supplied".to_owned()));
        }
        Ok(prepare_chat_with_tools(tools, user_msg, chat_history, options))
    }

    fn finish_chat(request: &ChatRequest, mut response: ChatResponse) -> ChatResponse {
        if !request.tools.is_empty() && !request.allow_parallel_tool_calls {
            force_single_tool_call(&mut response);
        }
        response
    }
}

fn record<T>(operation: &'static str, start: Instant, result: &Result<T, LlmError>, usage: impl Fn(&T) -> Option<Usage>) {
    metrics::record_llm_request(operation, start, result.is_ok());

    match result {
        Ok(value) => {
            if let Some(usage) = usage(value) {
                metrics::record_token_usage(operation, usage.prompt_tokens, usage.completion_tokens);
            }
            tracing::debug!(operation, elapsed_ms = start.elapsed().as_millis(), "deployment call finished");
        }
        Err(e) => {
            tracing::warn!(operation, error = %e, "deployment call failed");
        }
    }
}

/// Async client for a model deployment
pub struct DeploymentClient<T> {
    transport: T,
    core: Core,
}

impl DeploymentClient<HttpTransport> {
    /// Client talking HTTP to the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &DeploymentConfig) -> Result<Self, LlmError> {
        Ok(Self::new(HttpTransport::from_config(config)?, config))
    }
}

impl<T: Transport> DeploymentClient<T> {
    /// Client over an arbitrary transport
    pub fn new(transport: T, config: &DeploymentConfig) -> Self {
        Self {
            transport,
            core: Core::new(config),
        }
    }

    /// Model metadata derived from configuration
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.core.metadata
    }

    /// Text completion
    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = Instant::now();
        let body = self.core.settings.completion_body(request, false);

        let result = self.send(&body).await.and_then(|raw| normalize_completion(&raw));
        record("complete", start, &result, |r| r.usage);
        result
    }

    /// Streaming text completion
    pub async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<DeltaStream<CompletionDelta>, LlmError> {
        let start = Instant::now();
        let body = self.core.settings.completion_body(request, true);

        let result = self.transport.send_stream(&body).await.map_err(LlmError::from);
        record("stream_complete", start, &result, |_| None);

        Ok(Box::pin(normalize_stream(result?, CompletionAccumulator::new())))
    }

    /// Chat completion
    ///
    /// When the request offers tools without allowing parallel calls, only
    /// the first tool call is kept.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let body = self.core.settings.chat_body(request, false)?;

        let result = self
            .send(&body)
            .await
            .and_then(|raw| normalize_chat(&raw))
            .map(|response| Core::finish_chat(request, response));
        record("chat", start, &result, |r| r.usage);
        result
    }

    /// Streaming chat completion
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream<ChatDelta>, LlmError> {
        let start = Instant::now();
        let body = self.core.settings.chat_body(request, true)?;

        let result = self.transport.send_stream(&body).await.map_err(LlmError::from);
        record("stream_chat", start, &result, |_| None);

        Ok(Box::pin(normalize_stream(result?, ChatAccumulator::new())))
    }

    /// Chat offering `tools` to the model
    ///
    /// Use [`crate::tools::extract_tool_calls`] on the response to get the
    /// parsed calls.
    pub async fn chat_with_tools(
        &self,
        tools: &[ToolDefinition],
        user_msg: impl Into<Message>,
        chat_history: Vec<Message>,
        options: &ToolOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = Core::chat_with_tools_request(tools, user_msg.into(), chat_history, options)?;
        self.chat(&request).await
    }

    async fn send(&self, body: &Value) -> Result<Value, LlmError> {
        tracing::debug!(model = %self.core.settings.model, "sending deployment request");
        Ok(self.transport.send(body).await?)
    }
}

/// Blocking client for a model deployment
///
/// Must be used from a plain thread, never from inside an async runtime.
pub struct BlockingDeploymentClient<T> {
    transport: T,
    core: Core,
}

impl BlockingDeploymentClient<BlockingHttpTransport> {
    /// Client talking HTTP to the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or HTTP client cannot be built.
    pub fn from_config(config: &DeploymentConfig) -> Result<Self, LlmError> {
        Ok(Self::new(BlockingHttpTransport::from_config(config)?, config))
    }
}

impl<T: BlockingTransport> BlockingDeploymentClient<T> {
    /// Client over an arbitrary blocking transport
    pub fn new(transport: T, config: &DeploymentConfig) -> Self {
        Self {
            transport,
            core: Core::new(config),
        }
    }

    /// Model metadata derived from configuration
    pub const fn metadata(&self) -> &ModelMetadata {
        &self.core.metadata
    }

    /// Text completion
    pub fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = Instant::now();
        let body = self.core.settings.completion_body(request, false);

        let result = self.send(&body).and_then(|raw| normalize_completion(&raw));
        record("complete", start, &result, |r| r.usage);
        result
    }

    /// Streaming text completion
    pub fn stream_complete(&self, request: &CompletionRequest) -> Result<DeltaIter<CompletionDelta>, LlmError> {
        let start = Instant::now();
        let body = self.core.settings.completion_body(request, true);

        let result = self.transport.send_stream(&body).map_err(LlmError::from);
        record("stream_complete", start, &result, |_| None);

        Ok(Box::new(Deltas::new(result?, CompletionAccumulator::new())))
    }

    /// Chat completion
    ///
    /// When the request offers tools without allowing parallel calls, only
    /// the first tool call is kept.
    pub fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let body = self.core.settings.chat_body(request, false)?;

        let result = self
            .send(&body)
            .and_then(|raw| normalize_chat(&raw))
            .map(|response| Core::finish_chat(request, response));
        record("chat", start, &result, |r| r.usage);
        result
    }

    /// Streaming chat completion
    pub fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaIter<ChatDelta>, LlmError> {
        let start = Instant::now();
        let body = self.core.settings.chat_body(request, true)?;

        let result = self.transport.send_stream(&body).map_err(LlmError::from);
        record("stream_chat", start, &result, |_| None);

        Ok(Box::new(Deltas::new(result?, ChatAccumulator::new())))
    }

    /// Chat offering `tools` to the model
    pub fn chat_with_tools(
        &self,
        tools: &[ToolDefinition],
        user_msg: impl Into<Message>,
        chat_history: Vec<Message>,
        options: &ToolOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = Core::chat_with_tools_request(tools, user_msg.into(), chat_history, options)?;
        self.chat(&request)
    }

    fn send(&self, body: &Value) -> Result<Value, LlmError> {
        tracing::debug!(model = %self.core.settings.model, "sending deployment request");
        Ok(self.transport.send(body)?)
    }
}

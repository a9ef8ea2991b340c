//! Mock model deployment for integration tests
//!
//! Serves a single `/predict` route that answers `prompt` bodies as text
//! completions and `messages` bodies as chat, as JSON or as SSE when the
//! body asks for a stream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;

const DEFAULT_CONTENT: &str = "Hello from mock deployment";
const TOOL_ARGUMENTS: &str = r#"{"query":"test"}"#;

/// Mock deployment that returns predictable responses
pub struct MockDeployment {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    request_count: AtomicU32,
    /// Number of requests to fail with 503 before succeeding
    fail_count: AtomicU32,
    /// Answer every request (and every stream's first chunk) with `{}`
    malformed: bool,
    response_content: Option<String>,
    last_body: Mutex<Option<Value>>,
    last_authorization: Mutex<Option<String>>,
}

impl MockDeployment {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(MockState::default()).await
    }

    /// Start a mock server that fails the first `n` requests with 503
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_with(MockState {
            fail_count: AtomicU32::new(n),
            ..MockState::default()
        })
        .await
    }

    /// Start a mock server that answers with an empty JSON object, or an SSE
    /// stream whose first chunk is one
    pub async fn start_malformed() -> anyhow::Result<Self> {
        Self::start_with(MockState {
            malformed: true,
            ..MockState::default()
        })
        .await
    }

    /// Start a mock server with custom response content
    ///
    /// Streams split the content on spaces, one chunk per word.
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_with(MockState {
            response_content: Some(content.to_owned()),
            ..MockState::default()
        })
        .await
    }

    async fn start_with(state: MockState) -> anyhow::Result<Self> {
        let state = Arc::new(state);

        let app = Router::new()
            .route("/predict", routing::post(handle_predict))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Prediction endpoint URL
    pub fn endpoint(&self) -> Url {
        format!("http://{}/predict", self.addr).parse().expect("valid URL")
    }

    /// Number of requests received, failed ones included
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Body of the most recent request
    pub fn last_body(&self) -> Option<Value> {
        self.state.last_body.lock().unwrap().clone()
    }

    /// `Authorization` header of the most recent request
    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_authorization.lock().unwrap().clone()
    }
}

impl Drop for MockDeployment {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Handlers --

async fn handle_predict(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    *state.last_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *state.last_body.lock().unwrap() = Some(body.clone());

    // If fail_count > 0, decrement and return 503
    let remaining = state.fail_count.load(Ordering::Relaxed);
    if remaining > 0 {
        state.fail_count.fetch_sub(1, Ordering::Relaxed);
        return (StatusCode::SERVICE_UNAVAILABLE, "deployment is warming up").into_response();
    }

    let stream = body["stream"].as_bool().unwrap_or(false);

    if state.malformed {
        if stream {
            return sse(vec![json!({}), json!({"choices": [{"index": 0, "text": "unreachable"}]})]);
        }
        return Json(json!({})).into_response();
    }

    let content = state.response_content.as_deref().unwrap_or(DEFAULT_CONTENT);
    let has_tools = body["tools"].as_array().is_some_and(|tools| !tools.is_empty());

    match (body.get("prompt").is_some(), stream) {
        (true, false) => Json(completion(content)).into_response(),
        (true, true) => sse(completion_chunks(content)),
        (false, false) if has_tools => Json(tool_call_chat()).into_response(),
        (false, false) => Json(chat(content)).into_response(),
        (false, true) if has_tools => sse(tool_call_chunks()),
        (false, true) => sse(chat_chunks(content)),
    }
}

fn usage() -> Value {
    json!({"prompt_tokens": 7, "completion_tokens": 5, "total_tokens": 12})
}

fn completion(content: &str) -> Value {
    json!({
        "choices": [{"index": 0, "text": content, "finish_reason": "stop"}],
        "usage": usage(),
    })
}

fn chat(content: &str) -> Value {
    json!({
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
        }],
        "usage": usage(),
    })
}

fn tool_call_chat() -> Value {
    json!({
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "search", "arguments": TOOL_ARGUMENTS}},
                    {"id": "call_2", "type": "function", "function": {"name": "search", "arguments": r#"{"query":"more"}"#}},
                ],
            },
            "finish_reason": "tool_calls",
        }],
        "usage": usage(),
    })
}

fn words(content: &str) -> Vec<String> {
    let mut words: Vec<String> = content.split(' ').map(|w| format!("{w} ")).collect();
    if let Some(last) = words.last_mut() {
        last.pop();
    }
    words
}

fn completion_chunks(content: &str) -> Vec<Value> {
    let mut chunks: Vec<Value> = words(content)
        .into_iter()
        .map(|word| json!({"choices": [{"index": 0, "text": word, "finish_reason": null}]}))
        .collect();
    chunks.push(json!({"choices": [{"index": 0, "text": "", "finish_reason": "stop"}]}));
    chunks.push(json!({"choices": [], "usage": usage()}));
    chunks
}

fn chat_chunks(content: &str) -> Vec<Value> {
    let mut chunks = vec![json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]})];
    chunks.extend(
        words(content)
            .into_iter()
            .map(|word| json!({"choices": [{"index": 0, "delta": {"content": word}}]})),
    );
    chunks.push(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}));
    chunks.push(json!({"choices": [], "usage": usage()}));
    chunks
}

fn tool_call_chunks() -> Vec<Value> {
    vec![
        json!({"choices": [{"index": 0, "delta": {
            "role": "assistant",
            "tool_calls": [{"index": 0, "id": "call_1", "type": "function", "function": {"name": "search", "arguments": ""}}],
        }}]}),
        json!({"choices": [{"index": 0, "delta": {
            "tool_calls": [{"index": 0, "function": {"arguments": r#"{"query":"#}}],
        }}]}),
        json!({"choices": [{"index": 0, "delta": {
            "tool_calls": [{"index": 0, "function": {"arguments": r#""test"}"#}}],
        }}]}),
        json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
    ]
}

/// Build an SSE response from chunks, terminated by `[DONE]`
fn sse(chunks: Vec<Value>) -> Response {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

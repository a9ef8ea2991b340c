//! Response normalization and streaming-delta reconstruction
//!
//! Terminal payloads map straight to a response. Streaming chunks go through
//! an accumulator value that is threaded through each step: the step consumes
//! the accumulator and returns the next one together with the delta, so the
//! same accumulator always yields the same result for the same chunk.

use futures_util::{Stream, StreamExt, stream};
use serde_json::Value;

use crate::error::LlmError;
use crate::payload::{Payload, PayloadKind, ToolCallFragment};
use crate::types::{
    ChatDelta, ChatResponse, CompletionDelta, CompletionResponse, FunctionCall, Message, MessageToolCall, Role,
};

/// Streaming state that folds one raw chunk at a time
pub trait Accumulate: Sized {
    /// Incremental value produced per chunk
    type Delta;

    /// Fold one raw chunk into the accumulator
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidResponse`] when the chunk is malformed.
    fn step(self, raw: &Value) -> Result<(Self, Self::Delta), LlmError>;
}

/// Normalize a non-streaming completion payload
///
/// # Errors
///
/// Returns [`LlmError::InvalidResponse`] when the payload is malformed.
pub fn normalize_completion(raw: &Value) -> Result<CompletionResponse, LlmError> {
    match Payload::decode(PayloadKind::Completion, raw)? {
        Payload::Completion { text, meta } => Ok(CompletionResponse {
            text,
            usage: meta.usage,
            finish_reason: meta.finish_reason,
            logprobs: meta.logprobs,
            raw: raw.clone(),
        }),
        other => Err(LlmError::invalid(format!("expected completion payload, decoded {other:?}"))),
    }
}

/// Normalize a non-streaming chat payload
///
/// # Errors
///
/// Returns [`LlmError::InvalidResponse`] when the payload is malformed.
pub fn normalize_chat(raw: &Value) -> Result<ChatResponse, LlmError> {
    match Payload::decode(PayloadKind::Chat, raw)? {
        Payload::Chat { message, meta } => Ok(ChatResponse {
            message,
            usage: meta.usage,
            finish_reason: meta.finish_reason,
            logprobs: meta.logprobs,
            raw: raw.clone(),
        }),
        other => Err(LlmError::invalid(format!("expected chat payload, decoded {other:?}"))),
    }
}

/// Accumulated text of a streaming completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionAccumulator {
    text: String,
}

impl CompletionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text seen so far
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Accumulate for CompletionAccumulator {
    type Delta = CompletionDelta;

    fn step(mut self, raw: &Value) -> Result<(Self, CompletionDelta), LlmError> {
        let Payload::CompletionChunk { fragment, meta } = Payload::decode(PayloadKind::CompletionChunk, raw)? else {
            return Err(LlmError::invalid("expected completion chunk"));
        };

        self.text.push_str(&fragment);

        let delta = CompletionDelta {
            text: self.text.clone(),
            delta: fragment,
            usage: meta.usage,
            finish_reason: meta.finish_reason,
            raw: raw.clone(),
        };

        Ok((self, delta))
    }
}

/// Tool call being assembled from streaming fragments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialToolCall {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Argument JSON text received so far
    pub arguments: String,
}

impl PartialToolCall {
    fn merge(&mut self, fragment: ToolCallFragment) {
        if self.id.is_none() {
            self.id = fragment.id;
        }
        if self.name.is_none() {
            self.name = fragment.name;
        }
        self.arguments.push_str(&fragment.arguments);
    }

    fn to_message_call(&self) -> MessageToolCall {
        MessageToolCall {
            id: self.id.clone(),
            function: FunctionCall {
                name: self.name.clone().unwrap_or_default(),
                arguments: self.arguments.clone(),
            },
        }
    }
}

/// Accumulated message of a streaming chat
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatAccumulator {
    role: Option<Role>,
    content: String,
    tool_calls: Vec<PartialToolCall>,
}

impl ChatAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// First role observed, or assistant
    pub fn role(&self) -> Role {
        self.role.unwrap_or(Role::Assistant)
    }

    /// Content seen so far
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Tool calls assembled so far, in arrival order
    pub fn tool_calls(&self) -> &[PartialToolCall] {
        &self.tool_calls
    }

    /// Current accumulated message
    pub fn message(&self) -> Message {
        let tool_calls = (!self.tool_calls.is_empty())
            .then(|| self.tool_calls.iter().map(PartialToolCall::to_message_call).collect());

        Message {
            tool_calls,
            ..Message::new(self.role(), self.content.clone())
        }
    }

    fn merge_tool_call(&mut self, fragment: ToolCallFragment) {
        if let Some(existing) = self.tool_calls.iter_mut().find(|tc| tc.index == fragment.index) {
            existing.merge(fragment);
        } else {
            let mut call = PartialToolCall {
                index: fragment.index,
                ..PartialToolCall::default()
            };
            call.merge(fragment);
            self.tool_calls.push(call);
        }
    }
}

impl Accumulate for ChatAccumulator {
    type Delta = ChatDelta;

    fn step(mut self, raw: &Value) -> Result<(Self, ChatDelta), LlmError> {
        let Payload::ChatChunk {
            role,
            fragment,
            tool_calls,
            meta,
        } = Payload::decode(PayloadKind::ChatChunk, raw)?
        else {
            return Err(LlmError::invalid("expected chat chunk"));
        };

        if self.role.is_none() {
            self.role = role;
        }
        self.content.push_str(&fragment);
        for call in tool_calls {
            self.merge_tool_call(call);
        }

        let delta = ChatDelta {
            message: self.message(),
            delta: fragment,
            usage: meta.usage,
            finish_reason: meta.finish_reason,
            raw: raw.clone(),
        };

        Ok((self, delta))
    }
}

/// Iterator adapter turning raw chunks into deltas
///
/// Yields the first error it meets and then ends.
pub struct Deltas<I, A> {
    chunks: I,
    state: Option<A>,
}

impl<I, A> Deltas<I, A> {
    pub const fn new(chunks: I, initial: A) -> Self {
        Self {
            chunks,
            state: Some(initial),
        }
    }
}

impl<I, A, E> Iterator for Deltas<I, A>
where
    I: Iterator<Item = Result<Value, E>>,
    E: Into<LlmError>,
    A: Accumulate,
{
    type Item = Result<A::Delta, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        let acc = self.state.take()?;

        let stepped = match self.chunks.next()? {
            Ok(raw) => acc.step(&raw),
            Err(e) => Err(e.into()),
        };

        Some(stepped.map(|(acc, delta)| {
            self.state = Some(acc);
            delta
        }))
    }
}

/// Stream adapter turning raw chunks into deltas
///
/// Yields the first error it meets and then ends.
pub fn normalize_stream<S, A, E>(chunks: S, initial: A) -> impl Stream<Item = Result<A::Delta, LlmError>>
where
    S: Stream<Item = Result<Value, E>> + Unpin,
    E: Into<LlmError>,
    A: Accumulate,
{
    stream::unfold((chunks, Some(initial)), |(mut chunks, state)| async move {
        let acc = state?;

        let stepped = match chunks.next().await? {
            Ok(raw) => acc.step(&raw),
            Err(e) => Err(e.into()),
        };

        Some(match stepped {
            Ok((acc, delta)) => (Ok(delta), (chunks, Some(acc))),
            Err(e) => (Err(e), (chunks, None)),
        })
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::FinishReason;

    fn chat_chunk(content: &str) -> Value {
        json!({"choices": [{"delta": {"content": content}}], "usage": {}})
    }

    fn ok_chunks(chunks: Vec<Value>) -> impl Iterator<Item = Result<Value, LlmError>> {
        chunks.into_iter().map(Ok)
    }

    #[test]
    fn terminal_completion() {
        let raw = json!({"choices": [{"text": "Paris."}], "usage": {"total_tokens": 12}});
        let response = normalize_completion(&raw).unwrap();

        assert_eq!(response.text, "Paris.");
        assert_eq!(response.usage.unwrap().total_tokens, Some(12));
        assert_eq!(response.raw, raw);
    }

    #[test]
    fn terminal_chat() {
        let raw = json!({
            "choices": [{"message": {"role": "assistant", "content": "Why did the chicken cross the road?"}, "logprobs": {}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 15, "total_tokens": 25}
        });
        let response = normalize_chat(&raw).unwrap();

        assert_eq!(response.message.role, Role::Assistant);
        assert_eq!(response.message.content, "Why did the chicken cross the road?");
        assert_eq!(response.usage.unwrap().total_tokens, Some(25));
        assert_eq!(response.logprobs, None);
    }

    #[test]
    fn empty_payload_is_invalid() {
        assert!(matches!(normalize_completion(&json!({})), Err(LlmError::InvalidResponse(_))));
        assert!(matches!(normalize_chat(&json!({})), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn completion_fragments_accumulate() {
        let chunks = ["Once", " upon", " a", " time."]
            .map(|t| json!({"choices": [{"text": t}], "usage": {}}))
            .to_vec();

        let deltas: Vec<_> = Deltas::new(ok_chunks(chunks), CompletionAccumulator::new())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(deltas.len(), 4);
        assert_eq!(deltas[0].delta, "Once");
        assert_eq!(deltas[0].text, "Once");
        assert_eq!(deltas[1].text, "Once upon");
        assert_eq!(deltas[3].delta, " time.");
        assert_eq!(deltas[3].text, "Once upon a time.");
    }

    #[test]
    fn chat_fragments_accumulate() {
        let chunks = ["Why", " did", " the", " chicken?"].map(chat_chunk).to_vec();

        let deltas: Vec<ChatDelta> = Deltas::new(ok_chunks(chunks), ChatAccumulator::new())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(deltas.len(), 4);
        let joined: String = deltas.iter().map(|d| d.delta.as_str()).collect();
        assert_eq!(joined, "Why did the chicken?");

        let last = deltas.last().unwrap();
        assert_eq!(last.message.content, joined);
        assert_eq!(last.message.role, Role::Assistant);
        assert_eq!(last.message.tool_calls, None);
    }

    #[test]
    fn streamed_text_matches_terminal_text() {
        let fragments = ["The", " capital", " is", "", " Paris."];
        let terminal = normalize_completion(&json!({"choices": [{"text": fragments.concat()}]})).unwrap();

        let chunks = fragments.map(|t| json!({"choices": [{"text": t}]})).to_vec();
        let last = Deltas::new(ok_chunks(chunks), CompletionAccumulator::new())
            .last()
            .unwrap()
            .unwrap();

        assert_eq!(last.text, terminal.text);
    }

    #[test]
    fn empty_fragment_is_passed_through() {
        let (acc, first) = CompletionAccumulator::new()
            .step(&json!({"choices": [{"text": "a"}]}))
            .unwrap();
        let (_, second) = acc.step(&json!({"choices": [{"text": ""}]})).unwrap();

        assert_eq!(first.delta, "a");
        assert_eq!(second.delta, "");
        assert_eq!(second.text, "a");
    }

    #[test]
    fn step_is_idempotent_from_the_same_accumulator() {
        let (acc, _) = ChatAccumulator::new().step(&chat_chunk("Hello")).unwrap();
        let chunk = chat_chunk(" world");

        let (left, left_delta) = acc.clone().step(&chunk).unwrap();
        let (right, right_delta) = acc.step(&chunk).unwrap();

        assert_eq!(left, right);
        assert_eq!(left_delta, right_delta);
        assert_eq!(left.content(), "Hello world");
    }

    #[test]
    fn first_observed_role_wins() {
        let (acc, _) = ChatAccumulator::new()
            .step(&json!({"choices": [{"delta": {"content": "a"}}]}))
            .unwrap();
        assert_eq!(acc.role(), Role::Assistant);

        let (acc, _) = ChatAccumulator::new()
            .step(&json!({"choices": [{"delta": {"role": "user", "content": ""}}]}))
            .unwrap();
        let (acc, _) = acc
            .step(&json!({"choices": [{"delta": {"role": "assistant", "content": "b"}}]}))
            .unwrap();
        assert_eq!(acc.role(), Role::User);
    }

    #[test]
    fn tool_call_fragments_merge_by_index() {
        let chunks = vec![
            json!({"choices": [{"delta": {"role": "assistant", "tool_calls": [
                {"index": 0, "id": "call_a", "function": {"name": "search", "arguments": ""}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"query\":"}},
                {"index": 1, "id": "call_b", "function": {"name": "lookup", "arguments": "{}"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": " \"test\"}"}}
            ]}, "finish_reason": "tool_calls"}]}),
        ];

        let last = Deltas::new(ok_chunks(chunks), ChatAccumulator::new())
            .last()
            .unwrap()
            .unwrap();

        assert_eq!(last.finish_reason, Some(FinishReason::ToolCalls));
        let calls = last.message.tool_calls.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id.as_deref(), Some("call_a"));
        assert_eq!(calls[0].function.name, "search");
        assert_eq!(calls[0].function.arguments, "{\"query\": \"test\"}");
        assert_eq!(calls[1].function.name, "lookup");
    }

    #[test]
    fn usage_only_trailing_chunk() {
        let chunks = vec![
            chat_chunk("Hi"),
            json!({"choices": [], "usage": {"prompt_tokens": 2, "completion_tokens": 1, "total_tokens": 3}}),
        ];

        let deltas: Vec<ChatDelta> = Deltas::new(ok_chunks(chunks), ChatAccumulator::new())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(deltas[1].delta, "");
        assert_eq!(deltas[1].message.content, "Hi");
        assert_eq!(deltas[1].usage.unwrap().total_tokens, Some(3));
    }

    #[test]
    fn iterator_ends_after_first_error() {
        let chunks = vec![chat_chunk("a"), json!({}), chat_chunk("b")];
        let mut deltas = Deltas::new(ok_chunks(chunks), ChatAccumulator::new());

        assert!(deltas.next().unwrap().is_ok());
        assert!(matches!(deltas.next(), Some(Err(LlmError::InvalidResponse(_)))));
        assert!(deltas.next().is_none());
    }

    #[tokio::test]
    async fn stream_adapter_matches_iterator() {
        let chunks = ["Why", " did", " the", " chicken?"].map(chat_chunk).to_vec();

        let streamed: Vec<ChatDelta> = normalize_stream(
            stream::iter(chunks.clone().into_iter().map(Ok::<_, LlmError>)),
            ChatAccumulator::new(),
        )
        .map(Result::unwrap)
        .collect()
        .await;

        let iterated: Vec<ChatDelta> = Deltas::new(ok_chunks(chunks), ChatAccumulator::new())
            .map(Result::unwrap)
            .collect();

        assert_eq!(streamed, iterated);
    }

    #[tokio::test]
    async fn stream_adapter_ends_after_error() {
        let chunks = vec![Ok(chat_chunk("a")), Err(LlmError::invalid("boom")), Ok(chat_chunk("b"))];

        let results: Vec<_> = normalize_stream(stream::iter(chunks), ChatAccumulator::new())
            .collect()
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }
}

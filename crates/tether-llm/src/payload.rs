//! Boundary decode of raw backend payloads
//!
//! A raw JSON value is decoded into one [`Payload`] variant per payload kind
//! and validated here. Everything downstream works on the typed variant.

use serde::Deserialize;
use serde_json::Value;

use crate::error::LlmError;
use crate::protocol::{
    WireChat, WireChatChunk, WireCompletion, WireMessage, WireToolCallDelta, WireUsage,
};
use crate::types::{FinishReason, FunctionCall, LogProb, Message, MessageToolCall, Role, TokenLogProb, Usage};

/// Which shape a payload is expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Non-streaming text completion
    Completion,
    /// Non-streaming chat
    Chat,
    /// One chunk of a streaming completion
    CompletionChunk,
    /// One chunk of a streaming chat
    ChatChunk,
}

impl PayloadKind {
    const fn is_chunk(self) -> bool {
        matches!(self, Self::CompletionChunk | Self::ChatChunk)
    }
}

/// Per-choice data shared by every payload kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceMeta {
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    pub logprobs: Option<Vec<TokenLogProb>>,
}

/// Piece of a tool call carried by one streaming chat chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    /// Slot this fragment belongs to
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Partial JSON argument text
    pub arguments: String,
}

/// A validated backend payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Completion {
        text: String,
        meta: ChoiceMeta,
    },
    Chat {
        message: Message,
        meta: ChoiceMeta,
    },
    CompletionChunk {
        fragment: String,
        meta: ChoiceMeta,
    },
    ChatChunk {
        role: Option<Role>,
        fragment: String,
        tool_calls: Vec<ToolCallFragment>,
        meta: ChoiceMeta,
    },
}

impl Payload {
    /// Decode and validate a raw payload of the given kind
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidResponse`] when `choices` is missing or
    /// empty (a usage-only streaming chunk excepted) or when the first choice
    /// lacks the field its kind requires.
    pub fn decode(kind: PayloadKind, raw: &Value) -> Result<Self, LlmError> {
        match kind {
            PayloadKind::Completion | PayloadKind::CompletionChunk => decode_completion(kind, raw),
            PayloadKind::Chat => decode_chat(raw),
            PayloadKind::ChatChunk => decode_chat_chunk(raw),
        }
    }

    /// Shared per-choice data
    pub const fn meta(&self) -> &ChoiceMeta {
        match self {
            Self::Completion { meta, .. }
            | Self::Chat { meta, .. }
            | Self::CompletionChunk { meta, .. }
            | Self::ChatChunk { meta, .. } => meta,
        }
    }
}

fn deserialize<'a, T: Deserialize<'a>>(raw: &'a Value, what: &str) -> Result<T, LlmError> {
    T::deserialize(raw).map_err(|e| LlmError::invalid(format!("malformed {what} payload: {e}")))
}

/// Pull the first choice out of `choices`
///
/// `Ok(None)` means the chunk is usage-only and should become an empty
/// fragment.
fn first_choice<T>(
    choices: Option<Vec<T>>,
    usage: Option<&Usage>,
    kind: PayloadKind,
) -> Result<Option<T>, LlmError> {
    let Some(choices) = choices else {
        return Err(LlmError::invalid("response has no `choices` field"));
    };

    match choices.into_iter().next() {
        Some(choice) => Ok(Some(choice)),
        None if kind.is_chunk() && usage.is_some() => Ok(None),
        None => Err(LlmError::invalid("response `choices` is empty")),
    }
}

fn decode_completion(kind: PayloadKind, raw: &Value) -> Result<Payload, LlmError> {
    let wire: WireCompletion = deserialize(raw, "completion")?;
    let usage = normalize_usage(wire.usage);

    let Some(choice) = first_choice(wire.choices, usage.as_ref(), kind)? else {
        return Ok(Payload::CompletionChunk {
            fragment: String::new(),
            meta: ChoiceMeta {
                usage,
                ..ChoiceMeta::default()
            },
        });
    };

    let text = choice
        .text
        .ok_or_else(|| LlmError::invalid("completion choice has no `text` field"))?;

    let meta = ChoiceMeta {
        usage,
        finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
        logprobs: choice.logprobs.as_ref().and_then(normalize_logprobs),
    };

    Ok(match kind {
        PayloadKind::CompletionChunk => Payload::CompletionChunk { fragment: text, meta },
        _ => Payload::Completion { text, meta },
    })
}

fn decode_chat(raw: &Value) -> Result<Payload, LlmError> {
    let wire: WireChat = deserialize(raw, "chat")?;
    let usage = normalize_usage(wire.usage);

    let Some(choice) = first_choice(wire.choices, usage.as_ref(), PayloadKind::Chat)? else {
        return Err(LlmError::invalid("response `choices` is empty"));
    };

    let message = choice
        .message
        .ok_or_else(|| LlmError::invalid("chat choice has no `message` field"))?;

    Ok(Payload::Chat {
        message: decode_message(message)?,
        meta: ChoiceMeta {
            usage,
            finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
            logprobs: choice.logprobs.as_ref().and_then(normalize_logprobs),
        },
    })
}

fn decode_chat_chunk(raw: &Value) -> Result<Payload, LlmError> {
    let wire: WireChatChunk = deserialize(raw, "chat chunk")?;
    let usage = normalize_usage(wire.usage);

    let Some(choice) = first_choice(wire.choices, usage.as_ref(), PayloadKind::ChatChunk)? else {
        return Ok(Payload::ChatChunk {
            role: None,
            fragment: String::new(),
            tool_calls: Vec::new(),
            meta: ChoiceMeta {
                usage,
                ..ChoiceMeta::default()
            },
        });
    };

    let delta = choice
        .delta
        .ok_or_else(|| LlmError::invalid("chat chunk choice has no `delta` field"))?;

    let role = match delta.role.as_deref() {
        Some(r) => Some(Role::parse(r).ok_or_else(|| LlmError::invalid(format!("unknown message role `{r}`")))?),
        None => None,
    };

    let tool_calls = delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, fragment)| decode_tool_fragment(position, fragment))
        .collect();

    Ok(Payload::ChatChunk {
        role,
        fragment: delta.content.unwrap_or_default(),
        tool_calls,
        meta: ChoiceMeta {
            usage,
            finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
            logprobs: None,
        },
    })
}

fn decode_message(wire: WireMessage) -> Result<Message, LlmError> {
    let role = wire
        .role
        .as_deref()
        .ok_or_else(|| LlmError::invalid("chat message has no `role` field"))?;
    let role = Role::parse(role).ok_or_else(|| LlmError::invalid(format!("unknown message role `{role}`")))?;

    let tool_calls: Option<Vec<MessageToolCall>> = wire.tool_calls.map(|calls| {
        calls
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                function: FunctionCall {
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                },
            })
            .collect()
    });

    // A tool-calling assistant message may legitimately carry no text
    let has_tool_calls = tool_calls.as_ref().is_some_and(|calls| !calls.is_empty());
    let content = match wire.content {
        Some(content) => content,
        None if has_tool_calls => String::new(),
        None => return Err(LlmError::invalid("chat message has no `content` field")),
    };

    Ok(Message {
        role,
        content,
        name: wire.name,
        tool_calls,
        tool_call_id: wire.tool_call_id,
    })
}

fn decode_tool_fragment(position: usize, wire: WireToolCallDelta) -> ToolCallFragment {
    let (name, arguments) = wire
        .function
        .map(|f| (f.name, f.arguments.unwrap_or_default()))
        .unwrap_or_default();

    ToolCallFragment {
        index: wire.index.unwrap_or(position),
        id: wire.id,
        name,
        arguments,
    }
}

/// Keep usage only when at least one counter was reported
fn normalize_usage(wire: Option<WireUsage>) -> Option<Usage> {
    let wire = wire?;
    let usage = Usage {
        prompt_tokens: wire.prompt_tokens,
        completion_tokens: wire.completion_tokens,
        total_tokens: wire.total_tokens,
    };
    (!usage.is_empty()).then_some(usage)
}

/// Normalize either log-probability shape; anything unrecognized is absent
fn normalize_logprobs(raw: &Value) -> Option<Vec<TokenLogProb>> {
    let entries = if let Some(content) = raw.get("content").and_then(Value::as_array) {
        chat_logprobs(content)
    } else if let Some(tokens) = raw.get("tokens").and_then(Value::as_array) {
        completion_logprobs(raw, tokens)
    } else {
        return None;
    };

    (!entries.is_empty()).then_some(entries)
}

/// `{"content": [{"token", "logprob", "top_logprobs": [{"token", "logprob"}]}]}`
fn chat_logprobs(content: &[Value]) -> Vec<TokenLogProb> {
    content
        .iter()
        .filter_map(|entry| {
            let token = entry.get("token")?.as_str()?.to_owned();
            let top = entry
                .get("top_logprobs")
                .and_then(Value::as_array)
                .map(|alternatives| {
                    alternatives
                        .iter()
                        .filter_map(|alt| {
                            Some(LogProb {
                                token: alt.get("token")?.as_str()?.to_owned(),
                                logprob: alt.get("logprob")?.as_f64()?,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            Some(TokenLogProb {
                token,
                logprob: entry.get("logprob").and_then(Value::as_f64),
                top,
            })
        })
        .collect()
}

/// `{"tokens": [..], "token_logprobs": [..], "top_logprobs": [{token: logprob}]}`
fn completion_logprobs(raw: &Value, tokens: &[Value]) -> Vec<TokenLogProb> {
    let logprobs = raw.get("token_logprobs").and_then(Value::as_array);
    let tops = raw.get("top_logprobs").and_then(Value::as_array);

    tokens
        .iter()
        .enumerate()
        .filter_map(|(i, token)| {
            let token = token.as_str()?.to_owned();
            let logprob = logprobs.and_then(|l| l.get(i)).and_then(Value::as_f64);
            let top = tops
                .and_then(|t| t.get(i))
                .and_then(Value::as_object)
                .map(|alternatives| {
                    alternatives
                        .iter()
                        .filter_map(|(token, logprob)| {
                            Some(LogProb {
                                token: token.clone(),
                                logprob: logprob.as_f64()?,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            Some(TokenLogProb { token, logprob, top })
        })
        .collect()
}

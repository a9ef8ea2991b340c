//! Tool-calling request preparation and response extraction

use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::types::{ChatRequest, ChatResponse, Message, ToolCall, ToolChoice, ToolDefinition};

/// Options controlling how tools are offered to the model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOptions {
    /// Explicit tool-choice policy; wins over `tool_required`
    pub tool_choice: Option<ToolChoice>,
    /// Require the model to call at least one tool
    pub tool_required: bool,
    /// Keep every tool call of the response instead of only the first
    pub allow_parallel_tool_calls: bool,
}

/// Resolve the tool-choice policy
///
/// An explicit choice wins; otherwise `required` when a tool call is
/// required, else `auto`.
pub fn resolve_tool_choice(tool_choice: Option<ToolChoice>, tool_required: bool) -> ToolChoice {
    match tool_choice {
        Some(choice) => choice,
        None if tool_required => ToolChoice::REQUIRED,
        None => ToolChoice::AUTO,
    }
}

/// Force `additionalProperties: false` on a tool's parameter schema
pub fn strict_parameters(parameters: Option<&Value>) -> Value {
    let mut schema = match parameters {
        Some(Value::Object(schema)) => schema.clone(),
        _ => {
            let mut schema = Map::new();
            schema.insert("type".to_owned(), json!("object"));
            schema.insert("properties".to_owned(), json!({}));
            schema
        }
    };
    schema.insert("additionalProperties".to_owned(), Value::Bool(false));
    Value::Object(schema)
}

/// Build a chat request that offers `tools` to the model
///
/// Messages are `chat_history` followed by `user_msg`.
pub fn prepare_chat_with_tools(
    tools: &[ToolDefinition],
    user_msg: impl Into<Message>,
    chat_history: Vec<Message>,
    options: &ToolOptions,
) -> ChatRequest {
    let tools = tools
        .iter()
        .map(|tool| {
            let mut tool = tool.clone();
            tool.function.parameters = Some(strict_parameters(tool.function.parameters.as_ref()));
            tool
        })
        .collect();

    let mut messages = chat_history;
    messages.push(user_msg.into());

    ChatRequest {
        tools,
        tool_choice: Some(resolve_tool_choice(options.tool_choice.clone(), options.tool_required)),
        allow_parallel_tool_calls: options.allow_parallel_tool_calls,
        ..ChatRequest::new(messages)
    }
}

/// Parse the tool calls carried by a chat response
///
/// Calls keep the order in which the backend listed them. An empty or
/// whitespace-only argument string parses to an empty map.
///
/// # Errors
///
/// Returns [`LlmError::ToolArgumentParse`] when a call's arguments are not a
/// JSON object, and [`LlmError::NoToolCall`] when `error_on_no_tool_call` is
/// set and the response carries no calls.
pub fn extract_tool_calls(response: &ChatResponse, error_on_no_tool_call: bool) -> Result<Vec<ToolCall>, LlmError> {
    let raw_calls = response.message.tool_calls.as_deref().unwrap_or_default();

    if raw_calls.is_empty() {
        if error_on_no_tool_call {
            return Err(LlmError::NoToolCall);
        }
        return Ok(Vec::new());
    }

    raw_calls
        .iter()
        .map(|call| {
            let name = call.function.name.clone();
            let arguments = serde_json::from_str::<Map<String, Value>>(&call.function.arguments)
                .map_err(|source| LlmError::ToolArgumentParse {
                    tool: name.clone(),
                    source,
                })?;

            Ok(ToolCall {
                id: call.id.clone().unwrap_or_default(),
                name,
                arguments,
            })
        })
        .collect()
}

/// Keep only the first tool call on the response message
pub fn force_single_tool_call(response: &mut ChatResponse) {
    if let Some(calls) = response.message.tool_calls.as_mut() {
        calls.truncate(1);
    }
}

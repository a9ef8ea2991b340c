//! Request body construction
//!
//! Merge order for body parameters: configured temperature and max tokens,
//! then the deployment's `additional_kwargs`, then the call's typed
//! settings, then the call's own `additional` map.

use serde_json::{Map, Value, json};
use tether_config::DeploymentConfig;

use crate::error::LlmError;
use crate::protocol::{WireFunction, WireFunctionCall, WireMessage, WireTool, WireToolCall};
use crate::tools::strict_parameters;
use crate::types::{ChatRequest, CompletionRequest, GenerationParams, Message, ToolDefinition};

/// Deployment-wide defaults applied to every request body
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub additional_kwargs: Map<String, Value>,
}

impl From<&DeploymentConfig> for ModelSettings {
    fn from(config: &DeploymentConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            additional_kwargs: config.additional_kwargs.clone(),
        }
    }
}

impl ModelSettings {
    /// Body for a text completion
    pub fn completion_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut body = self.base_body();
        body.insert("prompt".to_owned(), Value::String(request.prompt.clone()));
        Self::finish(body, &request.params, stream)
    }

    /// Body for a chat call
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidRequest`] when the request has no messages.
    pub fn chat_body(&self, request: &ChatRequest, stream: bool) -> Result<Value, LlmError> {
        if request.messages.is_empty() {
            return Err(LlmError::InvalidRequest("chat request has no messages".to_owned()));
        }

        let mut body = self.base_body();

        let messages: Vec<WireMessage> = request.messages.iter().map(to_wire_message).collect();
        body.insert("messages".to_owned(), json!(messages));

        if !request.tools.is_empty() {
            let tools: Vec<WireTool> = request.tools.iter().map(to_wire_tool).collect();
            body.insert("tools".to_owned(), json!(tools));
            if let Some(choice) = &request.tool_choice {
                body.insert("tool_choice".to_owned(), choice.to_wire());
            }
        }

        Ok(Self::finish(body, &request.params, stream))
    }

    fn base_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("model".to_owned(), Value::String(self.model.clone()));
        body.insert("temperature".to_owned(), json!(self.temperature));
        body.insert("max_tokens".to_owned(), json!(self.max_tokens));

        for (key, value) in &self.additional_kwargs {
            body.insert(key.clone(), value.clone());
        }
        body
    }

    fn finish(mut body: Map<String, Value>, params: &GenerationParams, stream: bool) -> Value {
        if let Some(temperature) = params.temperature {
            body.insert("temperature".to_owned(), json!(temperature));
        }
        if let Some(max_tokens) = params.max_tokens {
            body.insert("max_tokens".to_owned(), json!(max_tokens));
        }
        if let Some(stop) = &params.stop {
            body.insert("stop".to_owned(), json!(stop));
        }
        if let Some(top_p) = params.top_p {
            body.insert("top_p".to_owned(), json!(top_p));
        }
        if let Some(seed) = params.seed {
            body.insert("seed".to_owned(), json!(seed));
        }
        for (key, value) in &params.additional {
            body.insert(key.clone(), value.clone());
        }
        if stream {
            body.insert("stream".to_owned(), Value::Bool(true));
        }
        Value::Object(body)
    }
}

fn to_wire_message(message: &Message) -> WireMessage {
    let tool_calls = message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                tool_type: "function".to_owned(),
                function: WireFunctionCall {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                },
            })
            .collect()
    });

    WireMessage {
        role: Some(message.role.as_str().to_owned()),
        content: Some(message.content.clone()),
        name: message.name.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn to_wire_tool(tool: &ToolDefinition) -> WireTool {
    WireTool {
        tool_type: tool.tool_type.clone(),
        function: WireFunction {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: strict_parameters(tool.function.parameters.as_ref()),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::ToolChoice;

    fn settings() -> ModelSettings {
        let mut additional_kwargs = Map::new();
        additional_kwargs.insert("top_k".to_owned(), json!(40));
        additional_kwargs.insert("top_p".to_owned(), json!(0.9));

        ModelSettings {
            model: "odsc-llm".to_owned(),
            temperature: 0.01,
            max_tokens: 512,
            additional_kwargs,
        }
    }

    #[test]
    fn completion_body_defaults() {
        let body = settings().completion_body(&CompletionRequest::new("What is the capital of France?"), false);

        assert_eq!(body["model"], "odsc-llm");
        assert_eq!(body["prompt"], "What is the capital of France?");
        assert_eq!(body["temperature"], json!(0.01));
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["top_k"], 40);
        assert!(body.get("stream").is_none());
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn per_call_params_override_configured() {
        let mut request = CompletionRequest::new("hi");
        request.params.temperature = Some(0.7);
        request.params.max_tokens = Some(16);
        request.params.top_p = Some(0.5);
        request.params.additional.insert("top_k".to_owned(), json!(5));

        let body = settings().completion_body(&request, true);

        assert_eq!(body["temperature"], json!(0.7));
        assert_eq!(body["max_tokens"], 16);
        assert_eq!(body["top_k"], 5);
        assert_eq!(body["top_p"], json!(0.5));
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn typed_params_override_additional_kwargs() {
        let mut settings = settings();
        settings.additional_kwargs.insert("temperature".to_owned(), json!(0.2));

        let body = settings.completion_body(&CompletionRequest::new("hi"), false);
        assert_eq!(body["temperature"], json!(0.2));
        assert_eq!(body["top_p"], json!(0.9));

        let mut request = CompletionRequest::new("hi");
        request.params.temperature = Some(1.0);
        request.params.top_p = Some(0.5);

        let body = settings.completion_body(&request, false);
        assert_eq!(body["temperature"], json!(1.0));
        assert_eq!(body["top_p"], json!(0.5));
    }

    #[test]
    fn chat_body_with_tools() {
        let mut request = ChatRequest::new(vec![Message::system("Be brief."), Message::user("Search Python")]);
        request.tools = vec![ToolDefinition::function("search", "Search the web", None)];
        request.tool_choice = Some(ToolChoice::REQUIRED);

        let body = settings().chat_body(&request, false).unwrap();

        assert_eq!(body["messages"][0], json!({"role": "system", "content": "Be brief."}));
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["parameters"]["additionalProperties"], false);
        assert_eq!(body["tool_choice"], "required");
        assert!(body.get("prompt").is_none());
    }

    #[test]
    fn chat_body_without_tools_omits_tool_choice() {
        let mut request = ChatRequest::new(vec![Message::user("hi")]);
        request.tool_choice = Some(ToolChoice::AUTO);

        let body = settings().chat_body(&request, false).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn chat_body_requires_messages() {
        let err = settings().chat_body(&ChatRequest::new(vec![]), false).unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}

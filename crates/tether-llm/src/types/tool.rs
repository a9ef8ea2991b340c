use std::convert::Infallible;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Definition of a tool the model can call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type (currently always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function specification
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    /// Function tool with the given JSON Schema for its parameters
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Option<serde_json::Value>,
    ) -> Self {
        Self {
            tool_type: "function".to_owned(),
            function: FunctionDefinition {
                name: name.into(),
                description: Some(description.into()),
                parameters,
            },
        }
    }
}

/// Specification of a callable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the function parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// How the model should select tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// Simple mode: "none", "auto", or "required"
    Mode(ToolChoiceMode),
    /// Force a specific function by name
    Function(String),
}

/// Tool selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    /// Model will not call any tools
    None,
    /// Model decides whether to call tools
    Auto,
    /// Model must call at least one tool
    Required,
}

impl ToolChoice {
    pub const NONE: Self = Self::Mode(ToolChoiceMode::None);
    pub const AUTO: Self = Self::Mode(ToolChoiceMode::Auto);
    pub const REQUIRED: Self = Self::Mode(ToolChoiceMode::Required);

    /// Backend representation: a bare string for modes, an object for a
    /// forced function
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Mode(mode) => {
                let s = match mode {
                    ToolChoiceMode::None => "none",
                    ToolChoiceMode::Auto => "auto",
                    ToolChoiceMode::Required => "required",
                };
                serde_json::Value::String(s.to_owned())
            }
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

/// Any string other than a mode name selects that function
impl FromStr for ToolChoice {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "none" => Self::NONE,
            "auto" => Self::AUTO,
            "required" => Self::REQUIRED,
            name => Self::Function(name.to_owned()),
        })
    }
}

/// A tool invocation extracted from a chat response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned call identifier (empty when the backend sent none)
    pub id: String,
    /// Function name
    pub name: String,
    /// Parsed arguments
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

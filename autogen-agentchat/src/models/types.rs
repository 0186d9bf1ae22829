use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them
    pub arguments: String,
}

/// Messages exchanged with a chat model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LlmMessage {
    System {
        content: String,
    },
    User {
        content: String,
        #[serde(default)]
        source: Option<String>,
    },
    Assistant {
        content: AssistantContent,
        #[serde(default)]
        source: Option<String>,
    },
    FunctionResult {
        call_id: String,
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        LlmMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>, source: Option<String>) -> Self {
        LlmMessage::User {
            content: content.into(),
            source,
        }
    }

    pub fn assistant_text(content: impl Into<String>, source: Option<String>) -> Self {
        LlmMessage::Assistant {
            content: AssistantContent::Text(content.into()),
            source,
        }
    }

    /// Text content, if this message carries any
    pub fn text(&self) -> Option<&str> {
        match self {
            LlmMessage::System { content }
            | LlmMessage::User { content, .. }
            | LlmMessage::FunctionResult { content, .. } => Some(content),
            LlmMessage::Assistant {
                content: AssistantContent::Text(text),
                ..
            } => Some(text),
            LlmMessage::Assistant { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssistantContent {
    Text(String),
    FunctionCalls(Vec<FunctionCall>),
}

/// Token usage of one model request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreateResultContent {
    Text(String),
    FunctionCalls(Vec<FunctionCall>),
}

/// Output of a model request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResult {
    pub content: CreateResultContent,
    #[serde(default)]
    pub usage: RequestUsage,
}

impl CreateResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: CreateResultContent::Text(content.into()),
            usage: RequestUsage::default(),
        }
    }

    pub fn function_calls(calls: Vec<FunctionCall>) -> Self {
        Self {
            content: CreateResultContent::FunctionCalls(calls),
            usage: RequestUsage::default(),
        }
    }
}

/// Per-participant model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Extra arguments passed through to the client
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_model() -> String {
    "default".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: None,
            max_tokens: None,
            extra: HashMap::new(),
        }
    }
}

//! Request and response types for chat completion calls.

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Creates a system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Named JSON schema the backend is asked to conform to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

/// Output constraint declared on a chat request.
///
/// Serializes to the wire shape
/// `{"type": "json_schema", "json_schema": {"name": ..., "strict": ..., "schema": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonSchema { json_schema: JsonSchemaFormat },
}

/// Body of a `POST /chat/completions` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of the message.
    Stop,
    /// Output was cut off by the token limit.
    Length,
    /// Output was withheld by a content filter.
    ContentFilter,
    ToolCalls,
    /// A reason this client does not know about.
    Other(String),
    /// The backend did not report a reason.
    Unknown,
}

impl FinishReason {
    /// Maps the wire value of `finish_reason` to a `FinishReason`.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            None => FinishReason::Unknown,
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }

    /// Returns true when generation stopped because of the output token limit.
    pub fn is_truncated(&self) -> bool {
        matches!(self, FinishReason::Length)
    }
}

/// The first choice of a chat completion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    pub content: Option<String>,
    /// Set when the backend declined to answer under a declared schema.
    pub refusal: Option<String>,
    pub finish_reason: FinishReason,
}

impl ChatCompletion {
    /// Builds a completion that stopped normally with the given content.
    pub fn stopped(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            refusal: None,
            finish_reason: FinishReason::Stop,
        }
    }
}

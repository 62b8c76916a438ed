/// OpenAI-compatible chat completion client module.
///
/// This module provides a blocking HTTP client for chat completion endpoints,
/// the request/response types exchanged with it, and the error taxonomy for
/// transport and protocol failures.
mod client;
mod types;

pub use client::{DEFAULT_BASE_URL, LlmClient, LlmClientBuilder, LlmClientTrait, LlmError};
pub use types::{
    ChatCompletion, ChatMessage, ChatRequest, FinishReason, JsonSchemaFormat, ResponseFormat, Role,
};

/// Chat completion HTTP client implementation.
///
/// This module provides `LlmClient` for making synchronous HTTP requests to an
/// OpenAI-compatible API, along with error types and a builder for configuration.
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::types::{ChatCompletion, ChatRequest, FinishReason};

/// Base URL used when neither the builder nor `OPENAI_BASE_URL` provides one.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Longest slice of an error response body kept in `LlmError::Http`.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Errors that can occur when talking to the chat completion API.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// Non-success HTTP status with the (truncated) error body
    #[error("HTTP error: status {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body was not the JSON shape we expected
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The API answered but the answer is unusable
    #[error("API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No API key was configured
    #[error("API key is required (set OPENAI_API_KEY or pass one explicitly)")]
    MissingApiKey,
}

impl LlmError {
    fn from_send(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LlmError::Timeout(error)
        } else {
            LlmError::Network(error)
        }
    }
}

/// Builder for constructing `LlmClient` instances.
///
/// # Examples
///
/// ```
/// use annot::llm::LlmClientBuilder;
///
/// let client = LlmClientBuilder::new()
///     .api_key("sk-test")
///     .base_url("http://localhost:8080/v1")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.base_url(), "http://localhost:8080/v1");
/// ```
#[derive(Debug, Default)]
pub struct LlmClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl LlmClientBuilder {
    /// Creates a new `LlmClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bearer token sent with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL of the API (e.g., "https://api.openai.com/v1").
    ///
    /// A blank value is treated as unset.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets an overall per-request timeout.
    ///
    /// Without this the transport's own default applies.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the `LlmClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// If `api_key()` was not called, `OPENAI_API_KEY` is used. A missing or
    /// blank key is an error.
    ///
    /// If `base_url()` was not called (or was blank), `OPENAI_BASE_URL` is used,
    /// falling back to [`DEFAULT_BASE_URL`].
    pub fn build(self) -> Result<LlmClient, LlmError> {
        let api_key = match self.api_key {
            Some(key) => key,
            None => std::env::var("OPENAI_API_KEY").unwrap_or_default(),
        };
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let base_url = self
            .base_url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| {
                std::env::var("OPENAI_BASE_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty())
            })
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        reqwest::Url::parse(&base_url)
            .map_err(|e| LlmError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(LlmError::Network)?;

        Ok(LlmClient {
            client,
            base_url,
            api_key,
        })
    }
}

/// Synchronous HTTP client for an OpenAI-compatible API.
///
/// Every call is a single blocking round trip; nothing is retried.
/// It should be constructed using `LlmClientBuilder`.
pub struct LlmClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

/// Trait for chat completion backend operations.
///
/// This trait enables mocking in unit tests and is the only way the annotation
/// engine and the connection probe talk to a backend.
pub trait LlmClientTrait: Send + Sync {
    /// Lists the model identifiers the backend offers, in backend order.
    fn list_models(&self) -> Result<Vec<String>, LlmError>;

    /// Sends one chat completion request and returns its first choice.
    fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError>;
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<ChoiceBody>,
}

#[derive(Deserialize)]
struct ChoiceBody {
    message: Option<MessageBody>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageBody {
    content: Option<String>,
    refusal: Option<String>,
}

impl LlmClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Reads the body of a response, turning non-success statuses into `LlmError::Http`.
    fn read_body(response: reqwest::blocking::Response) -> Result<String, LlmError> {
        let status = response.status();
        let body = response.text().map_err(LlmError::from_send)?;

        if !status.is_success() {
            return Err(LlmError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(body)
    }

    fn list_models_internal(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(&self.api_key)
            .send()
            .map_err(LlmError::from_send)?;

        let body = Self::read_body(response)?;
        let list: ModelList = serde_json::from_str(&body).map_err(LlmError::Serialization)?;

        Ok(list.data.into_iter().map(|model| model.id).collect())
    }

    fn chat_internal(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(LlmError::from_send)?;

        let body = Self::read_body(response)?;
        let completion: CompletionBody =
            serde_json::from_str(&body).map_err(LlmError::Serialization)?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Api {
                message: "Response contained no choices".to_string(),
            })?;

        let (content, refusal) = match choice.message {
            Some(message) => (message.content, message.refusal),
            None => (None, None),
        };

        Ok(ChatCompletion {
            content,
            refusal,
            finish_reason: FinishReason::from_wire(choice.finish_reason.as_deref()),
        })
    }
}

impl LlmClientTrait for LlmClient {
    fn list_models(&self) -> Result<Vec<String>, LlmError> {
        self.list_models_internal()
    }

    fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
        self.chat_internal(request)
    }
}

/// Extracts a readable message from an error response body.
///
/// Prefers the `error.message` field of an OpenAI-style error object and falls
/// back to the raw body, truncated to `MAX_ERROR_BODY_CHARS` characters.
fn error_message(body: &str) -> String {
    let structured = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    let message = structured.unwrap_or_else(|| body.trim().to_string());
    message.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

//! Connectivity check for an LLM endpoint.
//!
//! Lists the models a backend offers and narrows them to the ones that look
//! like chat models, so a caller can offer a sensible model picker.

use std::collections::BTreeSet;

use crate::llm::{LlmClientBuilder, LlmClientTrait};

/// Lowercase substrings that mark a model identifier as chat-capable.
pub const CHAT_MODEL_KEYWORDS: [&str; 8] = [
    "gpt-3.5", "gpt-4", "gpt-35", "claude", "chat", "turbo", "gemini", "flash",
];

/// Result of probing an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityReport {
    pub success: bool,
    pub message: String,
    /// Deduplicated, sorted model identifiers; empty on failure.
    pub models: Vec<String>,
}

impl ConnectivityReport {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            models: Vec::new(),
        }
    }
}

/// Returns true if the identifier matches one of [`CHAT_MODEL_KEYWORDS`].
pub fn is_chat_model(model_id: &str) -> bool {
    let lower = model_id.to_lowercase();
    CHAT_MODEL_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword))
}

/// Narrows a model catalog to chat-capable models.
///
/// Duplicates are removed and the result is sorted ascending. If no identifier
/// matches the chat heuristic, the whole (deduplicated) catalog is returned.
///
/// # Examples
///
/// ```
/// use annot::probe::select_chat_models;
///
/// let models = vec![
///     "gpt-4".to_string(),
///     "text-embedding-3".to_string(),
///     "gpt-3.5-turbo".to_string(),
/// ];
/// assert_eq!(select_chat_models(models), vec!["gpt-3.5-turbo", "gpt-4"]);
/// ```
pub fn select_chat_models(models: Vec<String>) -> Vec<String> {
    let all: BTreeSet<String> = models.into_iter().collect();
    let chat: Vec<String> = all.iter().filter(|m| is_chat_model(m)).cloned().collect();

    if chat.is_empty() {
        all.into_iter().collect()
    } else {
        chat
    }
}

/// Lists the backend's models and reports which ones can be used for annotation.
///
/// Never fails: transport and authentication errors come back as a report with
/// `success == false` and the error text in the message. A backend that answers
/// with an empty catalog is also reported as a failure.
pub fn probe(client: &dyn LlmClientTrait) -> ConnectivityReport {
    let models = match client.list_models() {
        Ok(models) => models,
        Err(e) => {
            tracing::warn!(error = %e, "connectivity probe failed");
            return ConnectivityReport::failure(format!("Connection failed: {}", e));
        }
    };

    let models = select_chat_models(models);
    if models.is_empty() {
        tracing::warn!("endpoint returned an empty model list");
        return ConnectivityReport::failure(
            "Connected, but the endpoint returned no models".to_string(),
        );
    }

    tracing::info!(count = models.len(), "connectivity probe succeeded");
    ConnectivityReport {
        success: true,
        message: format!("Connected! Found {} available chat models", models.len()),
        models,
    }
}

/// Builds a client from raw credentials and probes it.
///
/// Client construction errors (missing key, malformed URL) are reported the
/// same way as connection errors.
pub fn probe_endpoint(api_key: &str, base_url: Option<&str>) -> ConnectivityReport {
    let mut builder = LlmClientBuilder::new().api_key(api_key);
    if let Some(url) = base_url {
        builder = builder.base_url(url);
    }
    probe_with_builder(builder)
}

/// Builds a client from a configured builder and probes it.
pub fn probe_with_builder(builder: LlmClientBuilder) -> ConnectivityReport {
    match builder.build() {
        Ok(client) => probe(&client),
        Err(e) => ConnectivityReport::failure(format!("Connection failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatCompletion, ChatRequest, LlmError};

    struct CatalogClient {
        models: Result<Vec<&'static str>, u16>,
    }

    impl LlmClientTrait for CatalogClient {
        fn list_models(&self) -> Result<Vec<String>, LlmError> {
            match &self.models {
                Ok(models) => Ok(models.iter().map(|m| m.to_string()).collect()),
                Err(status) => Err(LlmError::Http {
                    status: *status,
                    message: "Incorrect API key provided".to_string(),
                }),
            }
        }

        fn chat(&self, _request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
            unreachable!("probe never sends chat requests")
        }
    }

    #[test]
    fn probe_filters_and_sorts_chat_models() {
        let client = CatalogClient {
            models: Ok(vec!["gpt-4", "text-embedding-3", "gpt-3.5-turbo"]),
        };

        let report = probe(&client);

        assert!(report.success);
        assert_eq!(report.models, vec!["gpt-3.5-turbo", "gpt-4"]);
        assert!(report.message.contains('2'));
    }

    #[test]
    fn probe_falls_back_to_full_catalog_when_nothing_matches() {
        let client = CatalogClient {
            models: Ok(vec!["qwen2.5:7b", "llama3", "mistral-large"]),
        };

        let report = probe(&client);

        assert!(report.success);
        assert_eq!(report.models, vec!["llama3", "mistral-large", "qwen2.5:7b"]);
    }

    #[test]
    fn probe_deduplicates_model_ids() {
        let client = CatalogClient {
            models: Ok(vec!["gpt-4", "gpt-4", "claude-3-haiku"]),
        };

        assert_eq!(probe(&client).models, vec!["claude-3-haiku", "gpt-4"]);
    }

    #[test]
    fn probe_reports_empty_catalog_as_failure() {
        let client = CatalogClient { models: Ok(vec![]) };

        let report = probe(&client);

        assert!(!report.success);
        assert!(report.models.is_empty());
    }

    #[test]
    fn probe_embeds_error_text_on_failure() {
        let client = CatalogClient { models: Err(401) };

        let report = probe(&client);

        assert!(!report.success);
        assert!(report.message.contains("401"));
        assert!(report.message.contains("Incorrect API key provided"));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(is_chat_model("GPT-4o"));
        assert!(is_chat_model("models/Gemini-1.5-Flash"));
        assert!(is_chat_model("deepseek-chat"));
        assert!(!is_chat_model("whisper-1"));
    }

    #[test]
    fn probe_endpoint_reports_invalid_url() {
        let report = probe_endpoint("sk-test", Some("not a url"));

        assert!(!report.success);
        assert!(report.message.contains("Invalid URL"));
    }
}

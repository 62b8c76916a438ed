//! Two-stage batch annotation engine.
//!
//! The engine first asks the backend for schema-constrained output. If that
//! fails or returns the wrong number of labels, it retries once with a plain
//! prompt that demands raw JSON and extracts the payload by hand. When both
//! stages fail, every item in the batch gets [`ANNOTATION_FAILED`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::llm::{LlmClientTrait, LlmError};

use super::extract::{self, ParseError};
use super::prompt::build_chat_request;
use super::request::{AnnotationRequest, AnnotationResult};

/// Label substituted for every item of a batch that could not be annotated.
pub const ANNOTATION_FAILED: &str = "ANNOTATION_FAILED";

/// The two ways a batch can be sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Backend output constrained to a declared JSON schema.
    Structured,
    /// Free-text output constrained only by prompt instructions.
    Fallback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Structured => write!(f, "structured"),
            Stage::Fallback => write!(f, "fallback"),
        }
    }
}

/// Reasons a single stage did not produce an acceptable result.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("backend call failed: {0}")]
    Backend(#[from] LlmError),

    #[error("response was truncated at the output token limit ({max_tokens} tokens)")]
    Truncated { max_tokens: u32 },

    #[error("backend refused to answer: {0}")]
    Refused(String),

    #[error("backend returned empty content")]
    EmptyContent,

    #[error("could not parse response: {0}")]
    Parse(#[from] ParseError),

    #[error("label count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

/// What happened to one batch.
#[derive(Debug)]
pub enum AnnotationOutcome {
    /// One of the stages produced a correctly sized result.
    Annotated {
        stage: Stage,
        result: AnnotationResult,
    },
    /// Both stages failed; carries each stage's reason.
    Failed {
        structured: AnnotationError,
        fallback: AnnotationError,
    },
}

impl AnnotationOutcome {
    pub fn is_annotated(&self) -> bool {
        matches!(self, AnnotationOutcome::Annotated { .. })
    }

    /// Returns the stage that produced the labels, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AnnotationOutcome::Annotated { stage, .. } => Some(*stage),
            AnnotationOutcome::Failed { .. } => None,
        }
    }

    /// Converts the outcome into one label per item.
    ///
    /// A failed outcome becomes `item_count` copies of [`ANNOTATION_FAILED`].
    pub fn into_labels(self, item_count: usize) -> Vec<String> {
        match self {
            AnnotationOutcome::Annotated { result, .. } => result.into_labels(),
            AnnotationOutcome::Failed { .. } => failed_labels(item_count),
        }
    }
}

/// Returns `count` failure sentinels.
pub fn failed_labels(count: usize) -> Vec<String> {
    vec![ANNOTATION_FAILED.to_string(); count]
}

/// Builder for constructing `Annotator` instances.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use annot::annotator::{AnnotationRequest, AnnotatorBuilder};
/// use annot::llm::LlmClientBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = LlmClientBuilder::new().api_key("sk-...").build()?;
/// let annotator = AnnotatorBuilder::new().client(Arc::new(client)).build();
///
/// let request = AnnotationRequest::new(
///     vec!["great product".to_string()],
///     "classify sentiment",
///     vec!["Positive".to_string(), "Negative".to_string()],
/// )?;
/// let labels = annotator.annotate(&request);
/// assert_eq!(labels.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct AnnotatorBuilder {
    client: Option<Arc<dyn LlmClientTrait>>,
}

impl AnnotatorBuilder {
    /// Creates a new `AnnotatorBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend client used for annotation calls.
    pub fn client(mut self, client: Arc<dyn LlmClientTrait>) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the `Annotator`.
    ///
    /// # Panics
    ///
    /// Panics if `client()` was not called before `build()`.
    #[must_use]
    pub fn build(self) -> Annotator {
        Annotator {
            client: self.client.expect("client must be set via client() method"),
        }
    }
}

/// Labels batches of text items using an LLM backend.
///
/// The annotator holds no state between calls; each `annotate` is independent.
pub struct Annotator {
    client: Arc<dyn LlmClientTrait>,
}

impl Annotator {
    /// Creates a new `Annotator` with the given backend client.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClientTrait>) -> Self {
        Self { client }
    }

    /// Annotates one batch, returning exactly one label per item.
    ///
    /// Never fails: if neither stage succeeds, every label is [`ANNOTATION_FAILED`].
    /// Labels are not checked against the option set.
    pub fn annotate(&self, request: &AnnotationRequest) -> Vec<String> {
        self.annotate_outcome(request).into_labels(request.len())
    }

    /// Annotates one batch and reports which stage succeeded or why both failed.
    pub fn annotate_outcome(&self, request: &AnnotationRequest) -> AnnotationOutcome {
        let structured = match self.run_stage(request, Stage::Structured) {
            Ok(result) => {
                return AnnotationOutcome::Annotated {
                    stage: Stage::Structured,
                    result,
                };
            }
            Err(e) => e,
        };
        tracing::warn!(
            error = %structured,
            items = request.len(),
            "structured annotation failed, falling back to plain JSON output"
        );

        match self.run_stage(request, Stage::Fallback) {
            Ok(result) => AnnotationOutcome::Annotated {
                stage: Stage::Fallback,
                result,
            },
            Err(fallback) => {
                tracing::warn!(
                    error = %fallback,
                    items = request.len(),
                    "fallback annotation failed, marking batch as failed"
                );
                AnnotationOutcome::Failed {
                    structured,
                    fallback,
                }
            }
        }
    }

    /// Runs a single stage and applies the shared label-count check.
    fn run_stage(
        &self,
        request: &AnnotationRequest,
        stage: Stage,
    ) -> Result<AnnotationResult, AnnotationError> {
        tracing::debug!(
            %stage,
            model = request.model_name(),
            items = request.len(),
            "requesting annotations"
        );

        let labels = match stage {
            Stage::Structured => self.structured_labels(request)?,
            Stage::Fallback => self.fallback_labels(request)?,
        };

        AnnotationResult::pair(request, labels)
    }

    fn structured_labels(
        &self,
        request: &AnnotationRequest,
    ) -> Result<Vec<String>, AnnotationError> {
        let completion = self
            .client
            .chat(&build_chat_request(request, Stage::Structured))?;

        if let Some(refusal) = completion.refusal {
            return Err(AnnotationError::Refused(refusal));
        }
        if completion.finish_reason.is_truncated() {
            return Err(AnnotationError::Truncated {
                max_tokens: request.max_tokens_value(),
            });
        }

        let content = completion.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AnnotationError::EmptyContent);
        }

        Ok(extract::parse_structured(&content)?)
    }

    fn fallback_labels(&self, request: &AnnotationRequest) -> Result<Vec<String>, AnnotationError> {
        let completion = self
            .client
            .chat(&build_chat_request(request, Stage::Fallback))?;

        // Truncated JSON cannot be trusted to hold complete, correctly indexed labels.
        if completion.finish_reason.is_truncated() {
            return Err(AnnotationError::Truncated {
                max_tokens: request.max_tokens_value(),
            });
        }

        let content = completion.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AnnotationError::EmptyContent);
        }

        extract::parse_annotations(&content).map_err(|e| {
            tracing::warn!(
                error = %e,
                preview = %extract::preview(&content),
                "unparseable annotation response"
            );
            AnnotationError::Parse(e)
        })
    }
}

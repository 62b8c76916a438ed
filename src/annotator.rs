//! Batch annotation of text items with an LLM backend.
//!
//! Given a batch of items, a natural-language labeling instruction and a fixed
//! option set, the [`Annotator`] returns one label per item, in item order.
//!
//! # Protocol
//!
//! 1. **Structured stage**: the backend is asked for output conforming to the
//!    schema `{"annotations": [string]}`. A correctly sized answer is returned
//!    immediately.
//! 2. **Fallback stage**: on any structured-stage failure (backend error,
//!    refusal, truncation, wrong label count) the same prompt is sent again with
//!    instructions to return raw JSON. The text is cleaned of markdown fences and
//!    surrounding prose before parsing.
//!
//! If the fallback stage also fails, every item in the batch is labelled
//! [`ANNOTATION_FAILED`]. Only the label count is enforced; labels outside the
//! option set are passed through.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use annot::annotator::{AnnotationRequest, AnnotatorBuilder, MaxTokens, self_test};
//! use annot::llm::LlmClientBuilder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LlmClientBuilder::new().build()?;
//! let annotator = AnnotatorBuilder::new().client(Arc::new(client)).build();
//!
//! // Check the end-to-end path before committing to a full dataset
//! let report = self_test(&annotator, "gpt-4o-mini");
//! println!("{}", report.message);
//!
//! let request = AnnotationRequest::new(
//!     vec!["great product".into(), "too expensive".into(), "it's okay".into()],
//!     "classify sentiment",
//!     vec!["Positive".into(), "Negative".into(), "Neutral".into()],
//! )?
//! .model("gpt-4o-mini")
//! .max_tokens(MaxTokens::Unlimited);
//!
//! for (item, label) in request.items().iter().zip(annotator.annotate(&request)) {
//!     println!("{item}: {label}");
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod extract;
mod prompt;
mod request;

pub use engine::{
    ANNOTATION_FAILED, AnnotationError, AnnotationOutcome, Annotator, AnnotatorBuilder, Stage,
    failed_labels,
};
pub use extract::{ParseError, clean_json_response, parse_annotations, parse_structured};
pub use prompt::{SYSTEM_PROMPT, annotation_schema, build_chat_request, build_prompt};
pub use request::{
    Annotation, AnnotationRequest, AnnotationResult, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE, IndexedItem, MaxTokens, RequestError, UNLIMITED_MAX_TOKENS,
};
pub use self_test::{SelfTestDetails, SelfTestReport, self_test};

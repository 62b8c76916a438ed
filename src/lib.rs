pub mod annotator;
pub mod batch;
pub mod llm;
pub mod probe;

pub use annotator::{
    ANNOTATION_FAILED, AnnotationOutcome, AnnotationRequest, AnnotationResult, Annotator,
    AnnotatorBuilder, MaxTokens, SelfTestReport, Stage, self_test,
};
pub use batch::{BatchProgress, BatchRun, BatchRunner, BatchTemplate};
pub use llm::{LlmClient, LlmClientBuilder, LlmClientTrait, LlmError};
pub use probe::{ConnectivityReport, probe, probe_endpoint, probe_with_builder};

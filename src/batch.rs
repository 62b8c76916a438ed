//! Sequential batch driver for whole datasets.
//!
//! Splits a dataset into fixed-size batches, annotates them one at a time and
//! concatenates the labels in input order. A failed batch contributes failure
//! sentinels and the run continues with the next batch.

use crate::annotator::{
    AnnotationRequest, Annotator, DEFAULT_MODEL, DEFAULT_TEMPERATURE, MaxTokens, RequestError,
};

/// Batch size used when the caller does not choose one.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Batches above this size tend to fail with long texts.
pub const RECOMMENDED_MAX_BATCH_SIZE: usize = 15;

/// Separator placed between column values when a row is turned into one item.
pub const ROW_SEPARATOR: &str = " | ";

/// Joins the selected column values of one row into a single item.
///
/// # Examples
///
/// ```
/// use annot::batch::row_text;
///
/// assert_eq!(row_text(["Great phone", "5 stars"]), "Great phone | 5 stars");
/// ```
pub fn row_text<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|field| field.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(ROW_SEPARATOR)
}

/// Instruction, options and generation parameters shared by every batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTemplate {
    pub instruction: String,
    pub options: Vec<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: MaxTokens,
}

impl BatchTemplate {
    /// Creates a template with default generation parameters.
    pub fn new(instruction: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            instruction: instruction.into(),
            options,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: MaxTokens::default(),
        }
    }

    /// Builds the request for one batch of items.
    pub fn request_for(&self, items: &[String]) -> Result<AnnotationRequest, RequestError> {
        Ok(
            AnnotationRequest::new(items.to_vec(), self.instruction.clone(), self.options.clone())?
                .model(self.model.clone())
                .temperature(self.temperature)?
                .max_tokens(self.max_tokens),
        )
    }
}

/// Progress reported after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 1-based number of the batch just finished.
    pub batch: usize,
    pub total_batches: usize,
    /// Items processed so far, including failed ones.
    pub annotated: usize,
    pub total_items: usize,
    /// Whether the batch just finished was marked as failed.
    pub failed: bool,
}

impl BatchProgress {
    /// Fraction of items processed, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_items == 0 {
            1.0
        } else {
            (self.annotated as f64 / self.total_items as f64).min(1.0)
        }
    }
}

/// Labels for a whole dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchRun {
    /// One label per input item, in input order.
    pub labels: Vec<String>,
    /// 1-based numbers of the batches that were marked as failed.
    pub failed_batches: Vec<usize>,
}

/// Runs a dataset through an [`Annotator`] one batch at a time.
pub struct BatchRunner<'a> {
    annotator: &'a Annotator,
    batch_size: usize,
}

impl<'a> BatchRunner<'a> {
    /// Creates a runner with [`DEFAULT_BATCH_SIZE`].
    pub fn new(annotator: &'a Annotator) -> Self {
        Self {
            annotator,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the number of items sent per backend call. Zero is treated as one.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > RECOMMENDED_MAX_BATCH_SIZE {
            tracing::warn!(
                batch_size,
                recommended = RECOMMENDED_MAX_BATCH_SIZE,
                "large batches may fail with long texts"
            );
        }
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size_value(&self) -> usize {
        self.batch_size
    }

    /// Number of batches `item_count` items will be split into.
    pub fn batch_count(&self, item_count: usize) -> usize {
        item_count.div_ceil(self.batch_size)
    }

    /// Annotates `items` batch by batch, calling `on_progress` after each batch.
    ///
    /// # Errors
    ///
    /// Returns `RequestError` before any backend call if the template is
    /// invalid (no options, duplicate options, bad temperature). Backend
    /// failures never abort the run.
    pub fn run<F>(
        &self,
        items: &[String],
        template: &BatchTemplate,
        mut on_progress: F,
    ) -> Result<BatchRun, RequestError>
    where
        F: FnMut(BatchProgress),
    {
        if items.is_empty() {
            return Ok(BatchRun::default());
        }

        let requests = items
            .chunks(self.batch_size)
            .map(|chunk| template.request_for(chunk))
            .collect::<Result<Vec<_>, _>>()?;

        let total_batches = requests.len();
        let mut run = BatchRun {
            labels: Vec::with_capacity(items.len()),
            failed_batches: Vec::new(),
        };

        for (index, request) in requests.iter().enumerate() {
            let batch = index + 1;
            let outcome = self.annotator.annotate_outcome(request);
            let failed = !outcome.is_annotated();
            if failed {
                run.failed_batches.push(batch);
            }
            run.labels.extend(outcome.into_labels(request.len()));

            tracing::info!(
                batch,
                total_batches,
                annotated = run.labels.len(),
                total_items = items.len(),
                failed,
                "batch processed"
            );
            on_progress(BatchProgress {
                batch,
                total_batches,
                annotated: run.labels.len(),
                total_items: items.len(),
                failed,
            });
        }

        Ok(run)
    }
}

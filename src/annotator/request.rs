//! Annotation requests, their generation parameters, and validated results.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::engine::AnnotationError;

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Sampling temperature used when a request does not set one.
pub const DEFAULT_TEMPERATURE: f64 = 0.1;

/// Output token cap used when a request does not set one.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Output token cap substituted for [`MaxTokens::Unlimited`].
pub const UNLIMITED_MAX_TOKENS: u32 = 8000;

/// Errors raised while building an [`AnnotationRequest`].
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("at least one item is required")]
    NoItems,

    #[error("at least one option is required")]
    NoOptions,

    #[error("options cannot be blank")]
    BlankOption,

    #[error("duplicate option: {0}")]
    DuplicateOption(String),

    #[error("temperature must be between 0 and 1, got {0}")]
    InvalidTemperature(f64),

    #[error("invalid max tokens '{0}': expected a positive integer or 'unlimited'")]
    InvalidMaxTokens(String),
}

/// Output token limit for one backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxTokens {
    Limited(u32),
    /// No caller-imposed limit; mapped to [`UNLIMITED_MAX_TOKENS`] on the wire.
    Unlimited,
}

impl MaxTokens {
    /// Returns the concrete token cap sent to the backend.
    pub fn resolve(self) -> u32 {
        match self {
            MaxTokens::Limited(n) => n,
            MaxTokens::Unlimited => UNLIMITED_MAX_TOKENS,
        }
    }
}

impl Default for MaxTokens {
    fn default() -> Self {
        MaxTokens::Limited(DEFAULT_MAX_TOKENS)
    }
}

impl FromStr for MaxTokens {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unlimited") {
            return Ok(MaxTokens::Unlimited);
        }

        match trimmed.parse::<u32>() {
            Ok(n) if n > 0 => Ok(MaxTokens::Limited(n)),
            _ => Err(RequestError::InvalidMaxTokens(s.to_string())),
        }
    }
}

impl fmt::Display for MaxTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxTokens::Limited(n) => write!(f, "{}", n),
            MaxTokens::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// An input item together with its position in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedItem<'a> {
    pub index: usize,
    pub text: &'a str,
}

/// One batch of items to label, with the instruction and option set.
///
/// Construction guarantees that `items` and `options` are non-empty and that
/// options are unique.
///
/// # Examples
///
/// ```
/// use annot::annotator::{AnnotationRequest, MaxTokens};
///
/// let request = AnnotationRequest::new(
///     vec!["great product".to_string(), "too expensive".to_string()],
///     "classify sentiment",
///     vec!["Positive".to_string(), "Negative".to_string()],
/// )
/// .unwrap()
/// .model("gpt-4o-mini")
/// .temperature(0.2)
/// .unwrap()
/// .max_tokens(MaxTokens::Unlimited);
///
/// assert_eq!(request.len(), 2);
/// assert_eq!(request.max_tokens_value(), 8000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRequest {
    items: Vec<String>,
    instruction: String,
    options: Vec<String>,
    model: String,
    temperature: f64,
    max_tokens: MaxTokens,
}

impl AnnotationRequest {
    /// Creates a request with default generation parameters.
    ///
    /// Options are trimmed; blank or repeated options are rejected.
    pub fn new(
        items: Vec<String>,
        instruction: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Self, RequestError> {
        if items.is_empty() {
            return Err(RequestError::NoItems);
        }
        let options = validate_options(options)?;

        Ok(Self {
            items,
            instruction: instruction.into(),
            options,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: MaxTokens::default(),
        })
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature; it must lie in `[0, 1]`.
    pub fn temperature(mut self, temperature: f64) -> Result<Self, RequestError> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(RequestError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(self)
    }

    /// Sets the output token limit.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: MaxTokens) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn temperature_value(&self) -> f64 {
        self.temperature
    }

    /// Returns the concrete token cap sent to the backend.
    pub fn max_tokens_value(&self) -> u32 {
        self.max_tokens.resolve()
    }

    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; a request holds at least one item.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the items paired with their batch positions.
    pub fn indexed_items(&self) -> impl Iterator<Item = IndexedItem<'_>> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, text)| IndexedItem { index, text })
    }
}

fn validate_options(options: Vec<String>) -> Result<Vec<String>, RequestError> {
    if options.is_empty() {
        return Err(RequestError::NoOptions);
    }

    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(options.len());
    for option in options {
        let option = option.trim().to_string();
        if option.is_empty() {
            return Err(RequestError::BlankOption);
        }
        if !seen.insert(option.clone()) {
            return Err(RequestError::DuplicateOption(option));
        }
        cleaned.push(option);
    }

    Ok(cleaned)
}

/// One labelled item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub index: usize,
    pub item: String,
    pub label: String,
}

/// Labels for a whole batch, paired with the items they belong to.
///
/// The only constructor checks that there is exactly one label per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationResult {
    annotations: Vec<Annotation>,
}

impl AnnotationResult {
    /// Pairs labels with the request's items by position.
    ///
    /// # Errors
    ///
    /// Returns `AnnotationError::CountMismatch` if the label count differs from
    /// the item count. Nothing is padded or truncated.
    pub fn pair(request: &AnnotationRequest, labels: Vec<String>) -> Result<Self, AnnotationError> {
        if labels.len() != request.len() {
            return Err(AnnotationError::CountMismatch {
                expected: request.len(),
                actual: labels.len(),
            });
        }

        let annotations = request
            .indexed_items()
            .zip(labels)
            .map(|(item, label)| Annotation {
                index: item.index,
                item: item.text.to_string(),
                label,
            })
            .collect();

        Ok(Self { annotations })
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Returns the labels in item order.
    pub fn labels(&self) -> Vec<&str> {
        self.annotations.iter().map(|a| a.label.as_str()).collect()
    }

    /// Consumes the result, returning the labels in item order.
    pub fn into_labels(self) -> Vec<String> {
        self.annotations.into_iter().map(|a| a.label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn sample_request() -> AnnotationRequest {
        AnnotationRequest::new(
            strings(&["great product", "too expensive", "it's okay"]),
            "classify sentiment",
            strings(&["Positive", "Negative", "Neutral"]),
        )
        .unwrap()
    }

    #[test]
    fn new_applies_default_generation_parameters() {
        let request = sample_request();

        assert_eq!(request.model_name(), DEFAULT_MODEL);
        assert_eq!(request.temperature_value(), DEFAULT_TEMPERATURE);
        assert_eq!(request.max_tokens_value(), DEFAULT_MAX_TOKENS);
        assert_eq!(request.len(), 3);
    }

    #[test]
    fn new_rejects_empty_items() {
        let result = AnnotationRequest::new(Vec::new(), "x", strings(&["A"]));
        assert_eq!(result.unwrap_err(), RequestError::NoItems);
    }

    #[test]
    fn new_rejects_empty_options() {
        let result = AnnotationRequest::new(strings(&["a"]), "x", Vec::new());
        assert_eq!(result.unwrap_err(), RequestError::NoOptions);
    }

    #[test]
    fn new_rejects_duplicate_options_after_trimming() {
        let result = AnnotationRequest::new(strings(&["a"]), "x", strings(&["Yes", " Yes "]));
        assert_eq!(
            result.unwrap_err(),
            RequestError::DuplicateOption("Yes".to_string())
        );
    }

    #[test]
    fn new_rejects_blank_options() {
        let result = AnnotationRequest::new(strings(&["a"]), "x", strings(&["Yes", "  "]));
        assert_eq!(result.unwrap_err(), RequestError::BlankOption);
    }

    #[test]
    fn temperature_outside_unit_interval_is_rejected() {
        assert_eq!(
            sample_request().temperature(1.5).unwrap_err(),
            RequestError::InvalidTemperature(1.5)
        );
        assert!(sample_request().temperature(-0.1).is_err());
        assert!(sample_request().temperature(0.0).is_ok());
        assert!(sample_request().temperature(1.0).is_ok());
    }

    #[test]
    fn unlimited_max_tokens_resolves_to_fixed_cap() {
        let request = sample_request().max_tokens(MaxTokens::Unlimited);
        assert_eq!(request.max_tokens_value(), UNLIMITED_MAX_TOKENS);
    }

    #[test]
    fn max_tokens_parses_numbers_and_unlimited() {
        assert_eq!("4000".parse::<MaxTokens>(), Ok(MaxTokens::Limited(4000)));
        assert_eq!("Unlimited".parse::<MaxTokens>(), Ok(MaxTokens::Unlimited));
        assert!("0".parse::<MaxTokens>().is_err());
        assert!("lots".parse::<MaxTokens>().is_err());
        assert_eq!(MaxTokens::Unlimited.to_string(), "unlimited");
    }

    #[test]
    fn indexed_items_expose_positions() {
        let request = sample_request();
        let indexed: Vec<_> = request.indexed_items().collect();

        assert_eq!(indexed[0], IndexedItem { index: 0, text: "great product" });
        assert_eq!(indexed[2], IndexedItem { index: 2, text: "it's okay" });
    }

    #[test]
    fn pair_matches_labels_to_items_by_position() {
        let request = sample_request();
        let result =
            AnnotationResult::pair(&request, strings(&["Positive", "Negative", "Neutral"]))
                .unwrap();

        assert_eq!(result.annotations()[1].item, "too expensive");
        assert_eq!(result.annotations()[1].label, "Negative");
        assert_eq!(result.labels(), vec!["Positive", "Negative", "Neutral"]);
    }

    #[test]
    fn pair_rejects_wrong_label_count() {
        let request = sample_request();
        let error =
            AnnotationResult::pair(&request, strings(&["Positive", "Negative"])).unwrap_err();

        assert!(matches!(
            error,
            AnnotationError::CountMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn pair_keeps_labels_outside_the_option_set() {
        let request = sample_request();
        let result =
            AnnotationResult::pair(&request, strings(&["Positive", "Other", "Neutral"])).unwrap();

        assert_eq!(result.into_labels(), strings(&["Positive", "Other", "Neutral"]));
    }
}

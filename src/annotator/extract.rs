//! Recovery of the `{"annotations": [...]}` payload from model output.
//!
//! Free-form model output often wraps the JSON in a markdown fence or adds a
//! sentence before or after it. These functions are pure so they can be tested
//! without a backend.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Number of characters of unparseable text kept for diagnostics.
const PREVIEW_CHARS: usize = 200;

/// Errors raised while turning model output into a list of labels.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response is empty")]
    Empty,

    #[error("invalid JSON: {source} (text: {preview})")]
    Json {
        #[source]
        source: serde_json::Error,
        preview: String,
    },

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("`annotations` must be an array")]
    AnnotationsNotArray,

    #[error("label at position {0} is not a string")]
    InvalidLabel(usize),
}

/// Schema-conforming payload returned by the structured stage.
#[derive(Debug, Deserialize)]
struct AnnotationPayload {
    annotations: Vec<String>,
}

/// Strips markdown fences and surrounding prose from model output.
///
/// If the text starts with a fence marker and spans at least three lines, the
/// first and last lines are dropped. Then, if a `{` is followed somewhere by a
/// `}`, the text is cut down to the span from the first `{` to the last `}`.
///
/// # Examples
///
/// ```
/// use annot::annotator::clean_json_response;
///
/// let raw = "```json\n{\"annotations\": [\"A\"]}\n```";
/// assert_eq!(clean_json_response(raw), "{\"annotations\": [\"A\"]}");
///
/// let chatty = "Sure! Here you go: {\"annotations\": []} Hope it helps.";
/// assert_eq!(clean_json_response(chatty), "{\"annotations\": []}");
/// ```
pub fn clean_json_response(text: &str) -> String {
    let mut text = text.trim().to_string();

    if text.starts_with("```") {
        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() >= 3 {
            text = lines[1..lines.len() - 1].join("\n").trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            text = text[start..=end].to_string();
        }
    }

    text.trim().to_string()
}

/// Parses fallback-stage output into labels.
///
/// The text is cleaned with [`clean_json_response`] first. A missing
/// `annotations` field yields an empty list; the caller's count check rejects it.
/// Numbers and booleans are accepted as labels and rendered as text.
pub fn parse_annotations(text: &str) -> Result<Vec<String>, ParseError> {
    let cleaned = clean_json_response(text);
    if cleaned.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: Value = serde_json::from_str(&cleaned).map_err(|source| ParseError::Json {
        source,
        preview: preview(&cleaned),
    })?;

    let object = match value {
        Value::Object(object) => object,
        other => return Err(ParseError::NotAnObject(json_kind(&other))),
    };

    match object.get("annotations") {
        None => Ok(Vec::new()),
        Some(Value::Array(labels)) => labels
            .iter()
            .enumerate()
            .map(|(index, label)| match label {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                _ => Err(ParseError::InvalidLabel(index)),
            })
            .collect(),
        Some(_) => Err(ParseError::AnnotationsNotArray),
    }
}

/// Parses structured-stage output, which must match the declared schema exactly.
pub fn parse_structured(content: &str) -> Result<Vec<String>, ParseError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ParseError::Empty);
    }

    serde_json::from_str::<AnnotationPayload>(content)
        .map(|payload| payload.annotations)
        .map_err(|source| ParseError::Json {
            source,
            preview: preview(content),
        })
}

/// Returns the first `PREVIEW_CHARS` characters of `text`, marking truncation.
pub(crate) fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_leaves_bare_json_untouched() {
        let text = r#"{"annotations": ["A", "B"]}"#;
        assert_eq!(clean_json_response(text), text);
    }

    #[test]
    fn clean_strips_json_fence() {
        let text = "```json\n{\"annotations\":[\"A\",\"B\"]}\n```";
        assert_eq!(clean_json_response(text), r#"{"annotations":["A","B"]}"#);
    }

    #[test]
    fn clean_strips_bare_fence_with_multiline_body() {
        let text = "```\n{\n  \"annotations\": [\"A\"]\n}\n```";
        assert_eq!(clean_json_response(text), "{\n  \"annotations\": [\"A\"]\n}");
    }

    #[test]
    fn clean_drops_prose_around_json() {
        let text = "Here are the labels:\n{\"annotations\": [\"A\"]}\nLet me know if you need more.";
        assert_eq!(clean_json_response(text), r#"{"annotations": ["A"]}"#);
    }

    #[test]
    fn clean_handles_fence_and_prose_together() {
        let text = "```json\nResult follows {\"annotations\": [\"A\", \"B\"]} done\n```";
        assert_eq!(clean_json_response(text), r#"{"annotations": ["A", "B"]}"#);
    }

    #[test]
    fn clean_keeps_short_fenced_text_for_brace_slicing() {
        // Two lines only: fence stripping is skipped, brace slicing still applies.
        let text = "```json {\"annotations\": [\"A\"]}\n```";
        assert_eq!(clean_json_response(text), r#"{"annotations": ["A"]}"#);
    }

    #[test]
    fn clean_without_braces_returns_trimmed_text() {
        assert_eq!(clean_json_response("  no json here  "), "no json here");
    }

    #[test]
    fn parse_recovers_fenced_annotations() {
        let labels = parse_annotations("```json\n{\"annotations\":[\"A\",\"B\"]}\n```").unwrap();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn parse_missing_field_yields_empty_list() {
        let labels = parse_annotations(r#"{"labels": ["A"]}"#).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn parse_stringifies_scalar_labels() {
        let labels = parse_annotations(r#"{"annotations": [1, true, "x"]}"#).unwrap();
        assert_eq!(labels, vec!["1", "true", "x"]);
    }

    #[test]
    fn parse_rejects_nested_labels() {
        let error = parse_annotations(r#"{"annotations": ["A", ["B"]]}"#).unwrap_err();
        assert!(matches!(error, ParseError::InvalidLabel(1)));
    }

    #[test]
    fn parse_rejects_non_array_annotations() {
        let error = parse_annotations(r#"{"annotations": "A"}"#).unwrap_err();
        assert!(matches!(error, ParseError::AnnotationsNotArray));
    }

    #[test]
    fn parse_rejects_top_level_array() {
        let error = parse_annotations(r#"["A", "B"]"#).unwrap_err();
        assert!(matches!(error, ParseError::NotAnObject("an array")));
    }

    #[test]
    fn parse_reports_invalid_json_with_preview() {
        let error = parse_annotations("{\"annotations\": [\"A\",").unwrap_err();
        match error {
            ParseError::Json { preview, .. } => assert!(preview.starts_with("{\"annotations\"")),
            other => panic!("expected Json error, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_whitespace_only_text() {
        assert!(matches!(parse_annotations("   \n "), Err(ParseError::Empty)));
    }

    #[test]
    fn structured_parse_requires_exact_schema() {
        assert_eq!(
            parse_structured(r#"{"annotations": ["A"]}"#).unwrap(),
            vec!["A"]
        );
        assert!(parse_structured(r#"{"annotations": [1]}"#).is_err());
        assert!(parse_structured("```json\n{\"annotations\": []}\n```").is_err());
        assert!(matches!(parse_structured(""), Err(ParseError::Empty)));
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "a".repeat(500);
        let short = preview(&long);
        assert_eq!(short.len(), PREVIEW_CHARS + 3);
        assert!(short.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}

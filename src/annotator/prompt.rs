//! Prompt construction for both annotation stages.

use crate::llm::{ChatMessage, ChatRequest, JsonSchemaFormat, ResponseFormat};

use super::engine::Stage;
use super::request::AnnotationRequest;

/// System-role guidance sent with every annotation call.
pub const SYSTEM_PROMPT: &str = "You are a professional data-labeling assistant. \
Follow the labeling instructions strictly.";

/// Name under which the output schema is declared to the backend.
const SCHEMA_NAME: &str = "annotation_result";

/// Extra rules for the fallback stage, where the backend is not schema-constrained.
const FALLBACK_FORMAT_RULES: &str = r#"
Return the result directly as JSON. Do not wrap it in a code block:
{"annotations": ["label 1", "label 2", "label 3", ...]}

Return ONLY the raw JSON object. Do not add ``` fences, explanations, or any other text.
"#;

/// Renders the user prompt for the given stage.
pub fn build_prompt(request: &AnnotationRequest, stage: Stage) -> String {
    // serde_json keeps non-ASCII characters unescaped
    let items = serde_json::to_string_pretty(request.items())
        .unwrap_or_else(|_| format!("{:?}", request.items()));

    let format_rules = match stage {
        Stage::Structured => "",
        Stage::Fallback => FALLBACK_FORMAT_RULES,
    };

    let count = request.len();
    let instruction = request.instruction();
    let options = request.options().join(", ");

    format!(
        r#"You are a professional data-labeling assistant. Label the data below according to the following requirement.

LABELING REQUIREMENT:
{instruction}

AVAILABLE OPTIONS:
{options}

Choose the most suitable option for every data item. If an item fits none of the options, choose the closest option or label it "Other".

DATA ({count} items, in order):
{items}
{format_rules}
IMPORTANT:
1. The number of labels returned must equal the number of data items exactly ({count})
2. Labels must be in the same order as the data items
3. Every label must be one of the available options
"#
    )
}

/// JSON schema of the structured-stage output: `{"annotations": [string]}`.
pub fn annotation_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "annotations": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["annotations"],
        "additionalProperties": false
    })
}

/// Builds the chat request for one stage of one batch.
pub fn build_chat_request(request: &AnnotationRequest, stage: Stage) -> ChatRequest {
    let response_format = match stage {
        Stage::Structured => Some(ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: SCHEMA_NAME.to_string(),
                strict: true,
                schema: annotation_schema(),
            },
        }),
        Stage::Fallback => None,
    };

    ChatRequest {
        model: request.model_name().to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(request, stage)),
        ],
        temperature: request.temperature_value(),
        max_tokens: request.max_tokens_value(),
        response_format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::MaxTokens;
    use crate::llm::Role;

    fn request() -> AnnotationRequest {
        AnnotationRequest::new(
            vec!["great product".to_string(), "价格太贵了".to_string()],
            "classify sentiment",
            vec!["Positive".to_string(), "Negative".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn prompt_embeds_instruction_options_and_items() {
        let prompt = build_prompt(&request(), Stage::Structured);

        assert!(prompt.contains("classify sentiment"));
        assert!(prompt.contains("Positive, Negative"));
        assert!(prompt.contains("\"great product\""));
        assert!(prompt.contains("(2 items, in order)"));
    }

    #[test]
    fn prompt_keeps_non_ascii_items_readable() {
        let prompt = build_prompt(&request(), Stage::Structured);
        assert!(prompt.contains("价格太贵了"));
    }

    #[test]
    fn only_fallback_prompt_demands_raw_json() {
        let structured = build_prompt(&request(), Stage::Structured);
        let fallback = build_prompt(&request(), Stage::Fallback);

        assert!(!structured.contains(r#"{"annotations":"#));
        assert!(fallback.contains(r#"{"annotations": ["label 1""#));
        assert!(fallback.contains("Do not wrap it in a code block"));
    }

    #[test]
    fn item_text_with_placeholder_syntax_is_not_expanded() {
        let request = AnnotationRequest::new(
            vec!["literal {format_rules} text".to_string()],
            "x",
            vec!["A".to_string()],
        )
        .unwrap();

        let prompt = build_prompt(&request, Stage::Fallback);
        assert!(prompt.contains("literal {format_rules} text"));
    }

    #[test]
    fn structured_request_declares_schema() {
        let chat = build_chat_request(&request(), Stage::Structured);

        let Some(ResponseFormat::JsonSchema { json_schema }) = &chat.response_format else {
            panic!("structured stage must declare a schema");
        };
        assert!(json_schema.strict);
        assert_eq!(json_schema.schema["required"][0], "annotations");
    }

    #[test]
    fn fallback_request_has_no_schema() {
        let chat = build_chat_request(&request(), Stage::Fallback);
        assert!(chat.response_format.is_none());
    }

    #[test]
    fn chat_request_carries_generation_parameters_and_roles() {
        let request = request()
            .model("gpt-4o")
            .temperature(0.3)
            .unwrap()
            .max_tokens(MaxTokens::Unlimited);
        let chat = build_chat_request(&request, Stage::Fallback);

        assert_eq!(chat.model, "gpt-4o");
        assert_eq!(chat.temperature, 0.3);
        assert_eq!(chat.max_tokens, 8000);
        assert_eq!(chat.messages[0].role, Role::System);
        assert_eq!(chat.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(chat.messages[1].role, Role::User);
    }
}

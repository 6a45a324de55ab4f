//! JSON extraction from free-form model text

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::LlmError;

/// Appended to instructions for backends without a native JSON mode
pub const JSON_ONLY_SUFFIX: &str = "\n\nRespond with valid JSON only, no markdown or explanations.";

/// ```json ... ``` or bare ``` ... ``` blocks
static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

/// Parse a model reply into a JSON object.
///
/// A ```json fenced block is preferred when present; otherwise the whole
/// trimmed text is parsed. Non-object JSON is rejected.
pub fn extract_json(text: &str) -> Result<Map<String, Value>, LlmError> {
    let body = FENCED_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LlmError::MalformedOutput(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
        Err(e) => Err(LlmError::MalformedOutput(e.to_string())),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_object() {
        let map = extract_json("  {\"total\": 12}\n").unwrap();
        assert_eq!(Value::Object(map), json!({"total": 12}));
    }

    #[test]
    fn fenced_block_with_prose() {
        let text = "Here you go:\n```json\n{\"vendor\": \"ACME\"}\n```\nAnything else?";
        let map = extract_json(text).unwrap();
        assert_eq!(Value::Object(map), json!({"vendor": "ACME"}));
    }

    #[test]
    fn unlabeled_fence() {
        let map = extract_json("```\n{\"a\": [1, 2]}\n```").unwrap();
        assert_eq!(Value::Object(map), json!({"a": [1, 2]}));
    }

    #[test]
    fn non_object_is_malformed() {
        let err = extract_json("[1, 2]").unwrap_err();
        assert_eq!(
            err,
            LlmError::MalformedOutput("expected a JSON object, got array".to_string())
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            extract_json("I could not find an invoice."),
            Err(LlmError::MalformedOutput(_))
        ));
    }
}

//! Post-processing: turn the model's raw response into validated JSON.
//!
//! The response must be a JSON document as-is. Apart from a leading
//! byte-order mark nothing is removed or rewritten: Markdown fences, prose
//! and truncated output are all reported as parse failures.

use crate::error::PipelineError;
use serde_json::Value;

/// Parse the raw response.
pub fn parse_response(raw: &str) -> Result<Value, PipelineError> {
    serde_json::from_str(strip_bom(raw)).map_err(|source| PipelineError::ModelOutputParse { source })
}

fn strip_bom(input: &str) -> &str {
    input.strip_prefix('\u{FEFF}').unwrap_or(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;

    #[test]
    fn plain_json_parses() {
        let v = parse_response(r#"{"total": 12.5}"#).unwrap();
        assert_eq!(v, json!({"total": 12.5}));
    }

    #[test]
    fn surrounding_whitespace_is_fine() {
        let v = parse_response("\n  [1, 2]\r\n").unwrap();
        assert_eq!(v, json!([1, 2]));
    }

    #[test]
    fn fenced_json_is_a_parse_error() {
        for raw in [
            "```json\n{\"summary\": {\"Travel\": 120}}\n```",
            "```\n{}\n```",
        ] {
            let err = parse_response(raw).unwrap_err();
            assert_eq!(err.kind(), FailureKind::ModelOutputParse, "for {raw:?}");
        }
    }

    #[test]
    fn bom_is_dropped() {
        assert_eq!(parse_response("\u{FEFF}{}").unwrap(), json!({}));
    }

    #[test]
    fn prose_is_a_parse_error() {
        let err = parse_response("Here is the JSON you asked for: {").unwrap_err();
        assert_eq!(err.kind(), FailureKind::ModelOutputParse);
        assert!(err.to_string().starts_with("LLM returned invalid JSON"));
    }

    #[test]
    fn fence_in_string_value_is_kept() {
        let raw = r#"{"note": "```json\n{}\n```"}"#;
        assert_eq!(parse_response(raw).unwrap(), json!({"note": "```json\n{}\n```"}));
    }
}

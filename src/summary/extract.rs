use serde_json::{Map, Value};

/// Find the first well-formed JSON object embedded in free-form model output.
///
/// Handles prose before or after the object, markdown fences and stray braces
/// that do not start valid JSON.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    for (start, _) in text.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = values.next() {
            return Some(map);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_object() {
        let map = extract_json_object(r#"{"severity": "low"}"#).unwrap();
        assert_eq!(map["severity"], "low");
    }

    #[test]
    fn code_block_with_prose() {
        let input = "Here is the summary:\n```json\n{\"severity\": \"high\", \"findings\": []}\n```\nLet me know!";
        let map = extract_json_object(input).unwrap();
        assert_eq!(map["severity"], "high");
    }

    #[test]
    fn skips_braces_that_are_not_json() {
        let input = "Template {placeholder} first, then {\"valid\": true} and {\"valid\": false}";
        let map = extract_json_object(input).unwrap();
        assert_eq!(map["valid"], true);
    }

    #[test]
    fn nested_objects_stay_intact() {
        let input = r#"prefix {"evidence": {"key_size": 2048}, "severity": "low"} suffix"#;
        let map = extract_json_object(input).unwrap();
        assert_eq!(map["evidence"]["key_size"], 2048);
    }

    #[test]
    fn nothing_to_extract() {
        assert!(extract_json_object("I cannot help with that.").is_none());
        assert!(extract_json_object("{ truncated").is_none());
        assert!(extract_json_object("").is_none());
    }
}

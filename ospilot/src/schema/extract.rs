//! JSON recovery from free model text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced block pattern is valid")
});

/// Recover a JSON value from model output.
///
/// Tries, in order: the whole trimmed text, a fenced code block, the span from
/// the first `{` to the last `}`, and finally the first balanced-brace object.
#[must_use]
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    if let Some(caps) = FENCED_BLOCK.captures(text)
        && let Ok(value) = serde_json::from_str(&caps[1])
    {
        return Some(value);
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str(&text[start..=end])
    {
        return Some(value);
    }

    first_json_object(text)
}

/// Find the first balanced-brace span in `text` that parses as a JSON object.
///
/// Braces inside string literals are ignored. Candidates that fail to parse are
/// skipped and the scan resumes at the next `{`.
#[must_use]
pub fn first_json_object(text: &str) -> Option<Value> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..])
            && let Ok(value @ Value::Object(_)) =
                serde_json::from_str::<Value>(&text[start..start + end])
        {
            return Some(value);
        }
        search_from = start + 1;
    }
    None
}

/// Byte length of the balanced object starting at the `{` at index 0.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_parse() {
        assert_eq!(
            extract_json(r#"  {"type": "chat", "response": "hi"}  "#),
            Some(json!({"type": "chat", "response": "hi"}))
        );
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here you go:\n```json\n{\"function\": \"lock_screen\"}\n```\nanything else? {";
        assert_eq!(extract_json(text), Some(json!({"function": "lock_screen"})));
    }

    #[test]
    fn test_surrounding_prose() {
        let text = r#"noise {"function":"set_timer","minutes":5} noise"#;
        assert_eq!(
            extract_json(text),
            Some(json!({"function": "set_timer", "minutes": 5}))
        );
    }

    #[test]
    fn test_two_objects_falls_back_to_first_balanced() {
        let text = r#"first {"function": "lock_screen"} then {"function": "sleep_system"}"#;
        assert_eq!(extract_json(text), Some(json!({"function": "lock_screen"})));
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"reply: {"type": "chat", "response": "use } and { freely"} done"#;
        assert_eq!(
            first_json_object(text),
            Some(json!({"type": "chat", "response": "use } and { freely"}))
        );
    }

    #[test]
    fn test_skips_unparseable_candidate() {
        let text = r#"{not json} but {"function": "get_system_info"}"#;
        assert_eq!(
            first_json_object(text),
            Some(json!({"function": "get_system_info"}))
        );
    }

    #[test]
    fn test_nothing_recoverable() {
        assert_eq!(extract_json("I am not sure what you mean."), None);
        assert_eq!(first_json_object("{ unterminated"), None);
    }
}

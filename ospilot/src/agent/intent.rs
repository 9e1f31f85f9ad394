//! Reading the model's reply.

use serde_json::{Map, Value};

use crate::schema::first_json_object;

const DEFAULT_CHAT_REPLY: &str = "I'm here to help!";

/// What a model reply asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// A conversational reply.
    Chat(String),
    /// A call of a catalog function.
    Call {
        /// Function name.
        function: String,
        /// Call parameters.
        params: Map<String, Value>,
    },
    /// Nothing usable.
    Unparsed,
}

impl Intent {
    /// Read the first JSON object in `text`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        first_json_object(text).map_or(Self::Unparsed, |value| Self::from_value(&value))
    }

    /// Interpret a reply object.
    ///
    /// `{"type": "chat", "response": ..}` is a chat reply. An object with a
    /// non-empty `function` is a call: its parameters are the nested `params`
    /// object when there is one, otherwise every other top-level field.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::Unparsed;
        };

        if object.get("type").and_then(Value::as_str) == Some("chat") {
            let reply = object
                .get("response")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_CHAT_REPLY);
            return Self::Chat(reply.to_owned());
        }

        match object.get("function").and_then(Value::as_str) {
            Some(function) if !function.trim().is_empty() => Self::Call {
                function: function.trim().to_owned(),
                params: call_params(object),
            },
            _ => Self::Unparsed,
        }
    }
}

fn call_params(object: &Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Object(params)) = object.get("params") {
        return params.clone();
    }
    object
        .iter()
        .filter(|(key, _)| key.as_str() != "function")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_reply() {
        assert_eq!(
            Intent::parse(r#"Sure! {"type": "chat", "response": "Hello there"}"#),
            Intent::Chat("Hello there".into())
        );
        assert_eq!(
            Intent::parse(r#"{"type": "chat"}"#),
            Intent::Chat("I'm here to help!".into())
        );
    }

    #[test]
    fn test_flat_call() {
        let intent = Intent::parse(r#"{"function": "set_timer", "minutes": 10}"#);
        assert_eq!(
            intent,
            Intent::Call {
                function: "set_timer".into(),
                params: json!({"minutes": 10}).as_object().cloned().unwrap(),
            }
        );
    }

    #[test]
    fn test_nested_params_call() {
        let intent = Intent::parse(
            r#"```json
{"function": "open_application", "params": {"app_name": "notepad"}}
```"#,
        );
        assert_eq!(
            intent,
            Intent::Call {
                function: "open_application".into(),
                params: json!({"app_name": "notepad"}).as_object().cloned().unwrap(),
            }
        );
    }

    #[test]
    fn test_unparsed() {
        assert_eq!(Intent::parse("I cannot do that"), Intent::Unparsed);
        assert_eq!(Intent::parse(r#"{"function": ""}"#), Intent::Unparsed);
        assert_eq!(Intent::from_value(&json!([1, 2])), Intent::Unparsed);
    }
}

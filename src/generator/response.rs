// Typed view of a chat-completion response body.
//
// The endpoint answers in one of three shapes: a completion, an error
// object (sometimes with HTTP 200), or something else entirely. Parsing
// goes through serde_json::Value so an unexpected shape becomes a
// Completion::Malformed instead of a deserialization error.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// `choices[0].message.content`, trimmed.
    Text(String),
    /// Explicit top-level `error`; carries its message.
    ApiError(String),
    /// Anything else; carries a description of what was wrong.
    Malformed(String),
}

impl Completion {
    pub fn parse(body: &Value) -> Self {
        let Some(object) = body.as_object() else {
            return Completion::Malformed(format!("expected a JSON object, got {}", kind(body)));
        };

        if let Some(error) = object.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Completion::ApiError(message);
        }

        let Some(choice) = object
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        else {
            return Completion::Malformed("no choices in response".to_string());
        };

        let Some(message) = choice.get("message").filter(|m| m.is_object()) else {
            return Completion::Malformed(format!("invalid choice format: {choice}"));
        };

        match message.get("content").and_then(Value::as_str) {
            Some(content) if !content.trim().is_empty() => {
                Completion::Text(content.trim().to_string())
            }
            Some(_) => Completion::Malformed("empty completion".to_string()),
            None => Completion::Malformed(format!("invalid message format: {message}")),
        }
    }
}

fn kind(value: &Value) -> &'static str {
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
    use serde_json::json;

    #[test]
    fn text_is_trimmed() {
        let body = json!({"choices":[{"message":{"role":"assistant","content":"  hola hoomans  "}}]});
        assert_eq!(Completion::parse(&body), Completion::Text("hola hoomans".into()));
    }

    #[test]
    fn error_object_wins() {
        let body = json!({"error":{"message":"bad key","code":401}});
        assert_eq!(Completion::parse(&body), Completion::ApiError("bad key".into()));
    }

    #[test]
    fn error_without_message_is_stringified() {
        let body = json!({"error":"quota"});
        assert_eq!(Completion::parse(&body), Completion::ApiError("\"quota\"".into()));
    }

    #[test]
    fn missing_or_empty_choices() {
        assert!(matches!(Completion::parse(&json!({})), Completion::Malformed(_)));
        assert!(matches!(
            Completion::parse(&json!({"choices":[]})),
            Completion::Malformed(_)
        ));
    }

    #[test]
    fn bad_inner_shapes() {
        assert!(matches!(
            Completion::parse(&json!({"choices":["text"]})),
            Completion::Malformed(_)
        ));
        assert!(matches!(
            Completion::parse(&json!({"choices":[{"message":{"role":"assistant"}}]})),
            Completion::Malformed(_)
        ));
        assert!(matches!(
            Completion::parse(&json!({"choices":[{"message":{"content":"   "}}]})),
            Completion::Malformed(_)
        ));
    }

    #[test]
    fn non_object_body() {
        match Completion::parse(&json!([1, 2])) {
            Completion::Malformed(why) => assert!(why.contains("an array")),
            other => panic!("expected malformed, got {other:?}"),
        }
    }
}

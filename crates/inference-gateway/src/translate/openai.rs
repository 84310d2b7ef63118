//! Identity translator for OpenAI-compatible endpoints

use serde_json::Value;

use super::{is_stream_metadata, request_object, strip_data_prefix, ProviderPayload, StreamDelta, Translator};
use crate::types::ChatRequest;

/// Translator for engines that already speak the OpenAI wire format
///
/// Used by OpenAI, Groq, Mistral, Nvidia and the local engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiTranslator;

/// `choices[0].delta.content` of a streaming chunk
pub(crate) fn delta_content(chunk: &Value) -> Option<&str> {
    chunk
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
}

impl Translator for OpenAiTranslator {
    fn transform_payload(&self, request: &ChatRequest) -> ProviderPayload {
        ProviderPayload::from(request_object(request))
    }

    fn transform_response(&self, body: Value) -> Value {
        body
    }

    fn transform_stream_line(&self, line: &str) -> StreamDelta {
        if is_stream_metadata(line) {
            return StreamDelta::Empty;
        }

        let chunk: Value = match serde_json::from_str(strip_data_prefix(line)) {
            Ok(chunk) => chunk,
            Err(_) => return StreamDelta::Incomplete,
        };

        match delta_content(&chunk) {
            Some(content) => StreamDelta::Text(content.to_string()),
            None => {
                if chunk.get("choices").is_none() {
                    log::warn!("Unrecognized OpenAI stream chunk: {}", chunk);
                }
                StreamDelta::Empty
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;
    use serde_json::json;

    #[test]
    fn test_payload_is_the_request() {
        let mut request = ChatRequest::new("gpt-4o", vec![ChatMessage::user("Hello!")]).streaming();
        request.temperature = Some(0.5);
        let payload = OpenAiTranslator.transform_payload(&request).into_value();
        assert_eq!(payload, serde_json::to_value(&request).unwrap());
    }

    #[test]
    fn test_response_is_unchanged() {
        let body = json!({"choices": [{"message": {"content": "Hi"}}]});
        assert_eq!(OpenAiTranslator.transform_response(body.clone()), body);
    }

    #[test]
    fn test_stream_line_with_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(
            OpenAiTranslator.transform_stream_line(line),
            StreamDelta::Text("Hi".into())
        );
    }

    #[test]
    fn test_role_only_delta_is_empty() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(OpenAiTranslator.transform_stream_line(line), StreamDelta::Empty);
    }

    #[test]
    fn test_split_json_is_incomplete() {
        let line = r#"data: {"choices":[{"delta":{"con"#;
        assert_eq!(
            OpenAiTranslator.transform_stream_line(line),
            StreamDelta::Incomplete
        );
    }

    #[test]
    fn test_keep_alive_is_empty() {
        assert_eq!(OpenAiTranslator.transform_stream_line(": ping"), StreamDelta::Empty);
        assert_eq!(OpenAiTranslator.transform_stream_line(""), StreamDelta::Empty);
    }
}

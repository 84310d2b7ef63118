//! Cohere chat API translator

use serde_json::{json, Value};

use super::{
    completion_body, is_stream_metadata, request_object, strip_data_prefix, ProviderPayload,
    StreamDelta, Translator,
};
use crate::types::ChatRequest;

const TEXT_GENERATION: &str = "text-generation";

/// Cohere chat roles
fn cohere_role(role: &str) -> Option<&'static str> {
    match role {
        "user" => Some("USER"),
        "assistant" => Some("CHATBOT"),
        _ => None,
    }
}

/// Translator for `https://api.cohere.ai/v1/chat`
///
/// Cohere takes the latest turn as `message`, earlier turns as
/// `chat_history` and the system prompt as `preamble`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CohereTranslator;

impl Translator for CohereTranslator {
    fn transform_payload(&self, request: &ChatRequest) -> ProviderPayload {
        let Some((last, earlier)) = request.messages.split_last() else {
            return ProviderPayload::empty();
        };

        let mut payload = request_object(request);
        payload.remove("messages");
        if let Some(top_p) = payload.remove("top_p") {
            payload.insert("p".into(), top_p);
        }
        if let Some(stop) = payload.remove("stop") {
            payload.insert("stop_sequences".into(), stop);
        }

        let mut chat_history = Vec::new();
        for message in earlier {
            if let Some(role) = cohere_role(&message.role) {
                chat_history.push(json!({ "role": role, "message": message.content }));
            } else if message.role == "system" {
                payload.insert("preamble".into(), json!(message.content));
            }
        }

        payload.insert("chat_history".into(), Value::Array(chat_history));
        payload.insert("message".into(), json!(last.content));
        ProviderPayload::from(payload)
    }

    fn transform_response(&self, body: Value) -> Value {
        match body.get("text").and_then(|t| t.as_str()) {
            Some(text) => completion_body(text),
            None => {
                log::warn!("Invalid Cohere response format: {}", body);
                completion_body("")
            }
        }
    }

    fn transform_stream_line(&self, line: &str) -> StreamDelta {
        if is_stream_metadata(line) {
            return StreamDelta::Empty;
        }

        let event: Value = match serde_json::from_str(strip_data_prefix(line)) {
            Ok(event) => event,
            Err(_) => return StreamDelta::Incomplete,
        };

        if let Some(kind) = event.get("event_type").and_then(|k| k.as_str()) {
            if kind != TEXT_GENERATION {
                return StreamDelta::Empty;
            }
        }

        match event.get("text").and_then(|t| t.as_str()) {
            Some(text) => StreamDelta::Text(text.to_string()),
            None => {
                log::warn!("Unrecognized Cohere stream event: {}", event);
                StreamDelta::Empty
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn test_zero_messages_yield_empty_payload() {
        let request = ChatRequest::new("command-r", vec![]);
        assert!(CohereTranslator.transform_payload(&request).is_empty());
    }

    #[test]
    fn test_messages_fold_into_history() {
        let mut request = ChatRequest::new(
            "command-r",
            vec![
                ChatMessage::system("You are terse."),
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello."),
                ChatMessage::user("How are you?"),
            ],
        );
        request.top_p = Some(0.75);
        request.stop = Some(vec!["END".into()]);

        let payload = CohereTranslator.transform_payload(&request).into_value();
        assert_eq!(payload["message"], "How are you?");
        assert_eq!(payload["preamble"], "You are terse.");
        assert_eq!(
            payload["chat_history"],
            json!([
                {"role": "USER", "message": "Hi"},
                {"role": "CHATBOT", "message": "Hello."},
            ])
        );
        assert_eq!(payload["model"], "command-r");
        assert_eq!(payload["p"], 0.75);
        assert_eq!(payload["stop_sequences"], json!(["END"]));
        assert!(payload.get("messages").is_none());
        assert!(payload.get("top_p").is_none());
    }

    #[test]
    fn test_single_message_has_empty_history() {
        let request = ChatRequest::new("command-r", vec![ChatMessage::user("Hello!")]);
        let payload = CohereTranslator.transform_payload(&request);
        assert_eq!(payload.get("message"), Some(&json!("Hello!")));
        assert_eq!(payload.get("chat_history"), Some(&json!([])));
    }

    #[test]
    fn test_whole_body_uses_text() {
        let normalized = CohereTranslator.transform_response(json!({"text": "Hi", "generation_id": "g"}));
        assert_eq!(normalized["choices"][0]["message"]["content"], "Hi");
    }

    #[test]
    fn test_stream_events() {
        let t = CohereTranslator;
        assert_eq!(
            t.transform_stream_line(r#"{"is_finished":false,"event_type":"text-generation","text":"Hi"}"#),
            StreamDelta::Text("Hi".into())
        );
        assert_eq!(
            t.transform_stream_line(r#"{"is_finished":false,"event_type":"stream-start","generation_id":"g"}"#),
            StreamDelta::Empty
        );
        assert_eq!(
            t.transform_stream_line(r#"{"is_finished":true,"event_type":"stream-end","response":{"text":"Hi"}}"#),
            StreamDelta::Empty
        );
        assert_eq!(
            t.transform_stream_line(r#"{"is_finished":false,"event_type":"text-gen"#),
            StreamDelta::Incomplete
        );
    }
}

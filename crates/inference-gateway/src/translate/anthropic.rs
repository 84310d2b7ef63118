//! Anthropic Messages API translator

use serde_json::{json, Map, Value};

use super::{completion_body, is_stream_metadata, ProviderPayload, StreamDelta, Translator};
use crate::constants::{defaults, sse};
use crate::types::ChatRequest;

const CONTENT_BLOCK_DELTA: &str = "content_block_delta";

/// Translator for `https://api.anthropic.com/v1/messages`
///
/// Requests keep only `model`, `messages`, `stream` and `max_tokens`.
/// System messages move to the top-level `system` field, which is where
/// the Messages API expects them.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicTranslator;

impl Translator for AnthropicTranslator {
    fn transform_payload(&self, request: &ChatRequest) -> ProviderPayload {
        let (system, messages): (Vec<_>, Vec<_>) = request
            .messages
            .iter()
            .partition(|message| message.role == "system");

        let mut payload = Map::new();
        payload.insert("model".into(), json!(request.model));
        payload.insert(
            "messages".into(),
            Value::Array(
                messages
                    .iter()
                    .map(|m| json!({ "role": m.role, "content": m.content }))
                    .collect(),
            ),
        );
        payload.insert("stream".into(), json!(request.stream));
        payload.insert(
            "max_tokens".into(),
            json!(request.max_tokens.unwrap_or(defaults::MAX_TOKENS)),
        );
        if !system.is_empty() {
            let preamble = system
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            payload.insert("system".into(), json!(preamble));
        }

        ProviderPayload::from(payload)
    }

    fn transform_response(&self, body: Value) -> Value {
        let text = body
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|block| block.get("text"))
            .and_then(|t| t.as_str());

        match text {
            Some(text) => completion_body(text),
            None => {
                log::warn!("Invalid Anthropic response format: {}", body);
                completion_body("")
            }
        }
    }

    fn transform_stream_line(&self, line: &str) -> StreamDelta {
        if is_stream_metadata(line) {
            return StreamDelta::Empty;
        }

        let Some(data) = line.strip_prefix(sse::DATA_PREFIX) else {
            log::warn!("Unrecognized Anthropic stream line: {}", line);
            return StreamDelta::Empty;
        };

        let event: Value = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(_) => return StreamDelta::Incomplete,
        };

        if event.get("type").and_then(|t| t.as_str()) != Some(CONTENT_BLOCK_DELTA) {
            return StreamDelta::Empty;
        }

        match event
            .get("delta")
            .and_then(|d| d.get("text"))
            .and_then(|t| t.as_str())
        {
            Some(text) => StreamDelta::Text(text.to_string()),
            None => StreamDelta::Empty,
        }
    }
}

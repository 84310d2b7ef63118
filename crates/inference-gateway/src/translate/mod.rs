//! Provider wire-format translators
//!
//! A translator converts a normalized [`ChatRequest`] into the body a
//! provider expects, and converts what the provider sends back (a whole body
//! or one line of its event stream) into normalized content. Translators are
//! pure: they never perform I/O and never fail. A shape they do not
//! recognize is logged and yields empty content, so one malformed chunk
//! cannot abort a stream.
//!
//! Providers that already speak the OpenAI chat-completion format (OpenAI,
//! Groq, Mistral, Nvidia and the local engine) share [`OpenAiTranslator`].

pub mod anthropic;
pub mod cohere;
pub mod openai;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::constants::sse;
use crate::types::ChatRequest;

pub use anthropic::AnthropicTranslator;
pub use cohere::CohereTranslator;
pub use openai::OpenAiTranslator;

/// Provider-shaped request body
///
/// Only the adapter and the translator that built it look inside. An empty
/// payload means there is nothing to send.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProviderPayload(Map<String, Value>);

impl ProviderPayload {
    pub fn empty() -> Self {
        Self(Map::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ProviderPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// What a translator made of one line of an upstream event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// The line carried text content
    Text(String),
    /// The line was understood but carries no content (metadata, other event types)
    Empty,
    /// The line looks like a JSON event that has not fully arrived yet
    Incomplete,
}

/// Request and response transforms for one provider
pub trait Translator: Send + Sync {
    /// Build the provider request body
    fn transform_payload(&self, request: &ChatRequest) -> ProviderPayload;

    /// Normalize a whole (non-streaming) response body to the OpenAI shape
    fn transform_response(&self, body: Value) -> Value;

    /// Interpret one line of the provider's event stream
    fn transform_stream_line(&self, line: &str) -> StreamDelta;
}

/// Serialize a request into a JSON object
pub(crate) fn request_object(request: &ChatRequest) -> Map<String, Value> {
    match serde_json::to_value(request) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            log::warn!("Chat request serialized to a non-object: {}", other);
            Map::new()
        }
        Err(e) => {
            log::warn!("Failed to serialize chat request: {}", e);
            Map::new()
        }
    }
}

/// Strip the SSE `data: ` prefix if present
pub(crate) fn strip_data_prefix(line: &str) -> &str {
    line.strip_prefix(sse::DATA_PREFIX).unwrap_or(line)
}

/// Lines that frame an event stream without carrying data
pub(crate) fn is_stream_metadata(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || trimmed.starts_with(':')
        || trimmed.starts_with(sse::EVENT_PREFIX.trim_end())
        || trimmed.starts_with("id:")
        || trimmed.starts_with("retry:")
}

/// Whole-body response in the OpenAI chat-completion shape
pub(crate) fn completion_body(text: &str) -> Value {
    json!({
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop",
        }],
    })
}

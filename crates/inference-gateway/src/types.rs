//! Common types for inference operations

use std::fmt;
use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Chat message (OpenAI-compatible)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Chat completion request (OpenAI-compatible)
///
/// Engines receive it by shared reference; nothing downstream of the
/// dispatcher mutates a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            max_tokens: None,
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Embedding input: a single text or a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

/// Embedding request (OpenAI-compatible)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

/// Normalized stream event
///
/// This is the only shape the client-facing layer sees, whatever engine
/// produced it. `End` and `Error` are terminal: nothing follows either.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text content
    Data(String),
    /// Upstream finished normally
    End,
    /// Upstream failed; carries the cause
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::End | StreamEvent::Error(_))
    }
}

/// How a streaming response is handed back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Parse upstream events into [`StreamEvent`]s
    #[default]
    Normalized,
    /// Copy the provider's native event-stream bytes through untouched
    Passthrough,
}

/// Stream of normalized events
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Stream of raw upstream bytes
pub type RawStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, EngineError>> + Send>>;

/// Result of an inference call
pub enum InferenceOutput {
    /// Whole response body, normalized to the OpenAI chat-completion shape
    Complete(serde_json::Value),
    /// Live stream of normalized events
    Stream(EventStream),
    /// Provider-native bytes (server-push passthrough)
    Passthrough(RawStream),
}

impl fmt::Debug for InferenceOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceOutput::Complete(body) => f.debug_tuple("Complete").field(body).finish(),
            InferenceOutput::Stream(_) => f.write_str("Stream(..)"),
            InferenceOutput::Passthrough(_) => f.write_str("Passthrough(..)"),
        }
    }
}

/// Client-facing streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<StreamChoice>,
}

/// Streaming choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

/// Delta content in streaming response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

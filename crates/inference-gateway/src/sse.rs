//! Server-sent event parsing and encoding
//!
//! Upstream bytes are decoded chunk by chunk, split into lines and handed to
//! the provider's [`Translator`]. A multibyte character cut by a chunk
//! boundary is held back as raw bytes until the rest of it arrives. A JSON event split across two chunks is
//! recovered by holding the first half in `pending` and retrying with the
//! next line. Only one fragment is held at a time: an event split across
//! three or more chunks is dropped without an error.

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;

use futures_util::{stream, Stream, StreamExt};

use crate::constants::sse;
use crate::translate::{StreamDelta, Translator};
use crate::types::{Delta, EventStream, StreamChoice, StreamChunk, StreamEvent};

/// Incremental parser for one upstream connection
pub struct SseParser {
    translator: Arc<dyn Translator>,
    pending: String,
    utf8_tail: Vec<u8>,
    done: bool,
}

impl SseParser {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            pending: String::new(),
            utf8_tail: Vec::new(),
            done: false,
        }
    }

    /// Whether the `[DONE]` terminator has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode one upstream chunk and return the content it completed, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(chunk);

        // Only an incomplete sequence at the very end is carried over
        let complete = match std::str::from_utf8(&bytes) {
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            _ => bytes.len(),
        };
        self.utf8_tail = bytes.split_off(complete);

        let text = String::from_utf8_lossy(&bytes);
        text.lines().filter_map(|line| self.push_line(line)).collect()
    }

    /// Process a single line
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if self.done {
            return None;
        }
        if line == sse::DONE {
            self.done = true;
            return None;
        }

        let candidate = if self.pending.is_empty() {
            line.to_string()
        } else {
            format!("{}{}", self.pending, line)
        };

        match self.translator.transform_stream_line(&candidate) {
            StreamDelta::Text(content) => {
                self.pending.clear();
                let cleaned = content
                    .strip_prefix(sse::ROLE_ECHO)
                    .unwrap_or(&content)
                    .to_string();
                (!cleaned.is_empty()).then_some(cleaned)
            }
            StreamDelta::Empty => {
                self.pending.clear();
                None
            }
            StreamDelta::Incomplete => {
                self.pending = line.to_string();
                None
            }
        }
    }
}

struct RelayState<S> {
    upstream: std::pin::Pin<Box<S>>,
    parser: SseParser,
    queue: VecDeque<StreamEvent>,
    finished: bool,
}

/// Relay an upstream byte stream as normalized events
///
/// Emits `Data` in arrival order, then exactly one `End` when upstream
/// completes, or one `Error` if upstream fails. Nothing follows either.
pub fn relay<S, B, E>(upstream: S, translator: Arc<dyn Translator>) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = RelayState {
        upstream: Box::pin(upstream),
        parser: SseParser::new(translator),
        queue: VecDeque::new(),
        finished: false,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(chunk)) => {
                    let contents = state.parser.feed(chunk.as_ref());
                    state.queue.extend(contents.into_iter().map(StreamEvent::Data));
                }
                Some(Err(e)) => {
                    log::error!("Upstream stream error: {}", e);
                    state.finished = true;
                    state.queue.push_back(StreamEvent::Error(e.to_string()));
                }
                None => {
                    state.finished = true;
                    state.queue.push_back(StreamEvent::End);
                }
            }
        }
    });

    Box::pin(events)
}

/// A stream holding a single terminal error
pub fn error_stream(cause: impl Into<String>) -> EventStream {
    Box::pin(stream::iter([StreamEvent::Error(cause.into())]))
}

/// Encode a normalized event in the client-facing OpenAI wire format
pub fn encode_event(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Data(content) => {
            let chunk = StreamChunk {
                choices: vec![StreamChoice {
                    delta: Delta {
                        content: Some(content.clone()),
                    },
                    finish_reason: None,
                }],
            };
            let json = serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string());
            format!("{}{}\n", sse::DATA_PREFIX, json)
        }
        StreamEvent::End => format!("{}\n", sse::DONE),
        StreamEvent::Error(cause) => {
            let json = serde_json::json!({ "error": { "message": cause } });
            format!("{}{}\n", sse::DATA_PREFIX, json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::{AnthropicTranslator, OpenAiTranslator};

    fn openai() -> Arc<dyn Translator> {
        Arc::new(OpenAiTranslator)
    }

    fn chunk_line(content: &str) -> String {
        format!(
            "data: {{\"id\":\"c1\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n",
            content
        )
    }

    fn full_response() -> String {
        response_of(&["Hel", "lo, ", "wor", "ld!"])
    }

    fn response_of(pieces: &[&str]) -> String {
        let mut body = String::from(
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        );
        for piece in pieces {
            body.push_str(&chunk_line(piece));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn run(chunks: Vec<Vec<u8>>, translator: Arc<dyn Translator>) -> Vec<StreamEvent> {
        let upstream = stream::iter(chunks.into_iter().map(Ok::<_, String>));
        relay(upstream, translator).collect().await
    }

    fn text_of(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Data(c) => Some(c.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_chunk_stream() {
        let events = run(vec![full_response().into_bytes()], openai()).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Data("Hel".into()),
                StreamEvent::Data("lo, ".into()),
                StreamEvent::Data("wor".into()),
                StreamEvent::Data("ld!".into()),
                StreamEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_split_at_every_offset_recovers_same_text() {
        let body = full_response().into_bytes();
        let expected = text_of(&run(vec![body.clone()], openai()).await);
        assert_eq!(expected, "Hello, world!");

        for offset in 0..=body.len() {
            let chunks = vec![body[..offset].to_vec(), body[offset..].to_vec()];
            let events = run(chunks, openai()).await;
            assert_eq!(text_of(&events), expected, "split at byte {}", offset);
            assert_eq!(events.last(), Some(&StreamEvent::End), "split at byte {}", offset);
        }
    }

    #[tokio::test]
    async fn test_split_inside_multibyte_characters() {
        let body = response_of(&["caf", "é ", "😀"]).into_bytes();
        for offset in 0..=body.len() {
            let chunks = vec![body[..offset].to_vec(), body[offset..].to_vec()];
            let events = run(chunks, openai()).await;
            assert_eq!(text_of(&events), "café 😀", "split at byte {}", offset);
        }
    }

    #[test]
    fn test_character_cut_between_chunks_is_reassembled() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"😀\"}}]}\n".as_bytes();
        // Cut after the first byte of the four-byte emoji
        let cut = line.iter().position(|&b| b == 0xF0).unwrap() + 1;

        let mut parser = SseParser::new(openai());
        assert!(parser.feed(&line[..cut]).is_empty());
        assert_eq!(parser.feed(&line[cut..]), vec!["😀".to_string()]);
    }

    #[tokio::test]
    async fn test_three_way_split_drops_the_event() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n";
        let chunks = vec![
            line[..12].as_bytes().to_vec(),
            line[12..30].as_bytes().to_vec(),
            line[30..].as_bytes().to_vec(),
        ];
        let events = run(chunks, openai()).await;
        assert_eq!(events, vec![StreamEvent::End]);
    }

    #[tokio::test]
    async fn test_upstream_error_is_terminal() {
        let upstream = stream::iter(vec![
            Ok(chunk_line("Hi").into_bytes()),
            Err("connection reset".to_string()),
            Ok(chunk_line("never").into_bytes()),
        ]);
        let events: Vec<_> = relay(upstream, openai()).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Data("Hi".into()),
                StreamEvent::Error("connection reset".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_lines_after_done_are_ignored() {
        let body = format!("{}data: [DONE]\n{}", chunk_line("a"), chunk_line("b"));
        let events = run(vec![body.into_bytes()], openai()).await;
        assert_eq!(events, vec![StreamEvent::Data("a".into()), StreamEvent::End]);
    }

    #[tokio::test]
    async fn test_anthropic_event_lines() {
        let chunks = vec![
            b"event: content_block_delta\n".to_vec(),
            b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hi\"}}\n".to_vec(),
        ];
        let events = run(chunks, Arc::new(AnthropicTranslator)).await;
        assert_eq!(events, vec![StreamEvent::Data("Hi".into()), StreamEvent::End]);
    }

    #[test]
    fn test_role_echo_is_stripped() {
        let mut parser = SseParser::new(openai());
        let content = parser.push_line(r#"data: {"choices":[{"delta":{"content":"assistant: Hi"}}]}"#);
        assert_eq!(content.as_deref(), Some("Hi"));
        assert!(!parser.is_done());
        assert_eq!(parser.push_line("data: [DONE]"), None);
        assert!(parser.is_done());
    }

    #[test]
    fn test_encode_event() {
        assert_eq!(
            encode_event(&StreamEvent::Data("Hi".into())),
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n"
        );
        assert_eq!(encode_event(&StreamEvent::End), "data: [DONE]\n");
        assert!(encode_event(&StreamEvent::Error("boom".into())).contains("\"message\":\"boom\""));
    }
}

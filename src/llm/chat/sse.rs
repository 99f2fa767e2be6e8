//! Incremental decoding of `text/event-stream` chat-completion bodies.

use log::debug;
use serde::Deserialize;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A content fragment from `choices[0].delta.content`.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Splits a byte stream into `data:` lines and decodes each one.
///
/// Bytes are buffered until a newline arrives, so a line split across network
/// chunks (including inside a multi-byte UTF-8 sequence) is decoded once, whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = decode_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes whatever is left once the body has ended without a final newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        decode_line(&String::from_utf8_lossy(&line))
    }
}

pub fn decode_line(line: &str) -> Option<SseEvent> {
    let line = line.trim();
    let data = line.strip_prefix("data:")?.trim_start();
    if data == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            let content = resp.choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)?;
            if content.is_empty() {
                None
            } else {
                Some(SseEvent::Delta(content))
            }
        }
        Err(e) => {
            debug!("Skipping malformed stream line ({}): {}", e, data);
            None
        }
    }
}

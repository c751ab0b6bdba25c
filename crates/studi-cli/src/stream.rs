//! Reassembly of the gateway's SSE byte stream into chat events
//!
//! The HTTP reader hands over arbitrary byte chunks; an event or even a
//! single line may arrive split across two reads. [`SseFrameDecoder`]
//! buffers until a blank-line delimiter completes an event, and
//! [`parse_event`] turns one raw event into the chat events the renderer
//! consumes. One malformed payload never aborts the stream.

use tracing::warn;

/// Incremental event framer over the raw byte stream
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: String,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one read's bytes and drain every event completed by it
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let raw = self.buffer[..idx].to_string();
            self.buffer = self.buffer[idx + 2..].to_string();
            if !raw.trim().is_empty() {
                events.push(raw);
            }
        }
        events
    }

    /// Flush an unterminated tail as one final event when the reader ends
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim();
        (!tail.is_empty()).then(|| tail.to_string())
    }
}

/// One decoded event from the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Token(String),
    Usage { sent: u32, received: u32 },
    Error(String),
}

/// Decode the `data:` lines of one raw event.
///
/// The `[DONE]` control literal is skipped, never JSON-parsed. A payload
/// that fails to parse is logged and dropped; later events still count.
pub fn parse_event(raw: &str) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    for line in raw.lines() {
        let Some(payload) = line.strip_prefix("data: ") else {
            continue;
        };
        if payload == "[DONE]" {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("dropping malformed stream event: {e}");
                continue;
            }
        };
        if let Some(token) = value.get("token").and_then(|t| t.as_str()) {
            events.push(ChatEvent::Token(token.to_string()));
        } else if let Some(tokens) = value.get("tokens") {
            events.push(ChatEvent::Usage {
                sent: tokens.get("sent").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                received: tokens.get("received").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            });
        } else if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
            events.push(ChatEvent::Error(message.to_string()));
        }
    }
    events
}

/// Lifecycle of one chat request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    /// Request sent, nothing received; the typing indicator is showing
    AwaitingFirstChunk,
    Streaming,
    Finalized,
    /// The network call itself failed. A mid-stream parse error does NOT
    /// land here; those events are dropped and the phase stands.
    Error,
}

/// Accumulates one streamed answer and walks the request phases
#[derive(Debug)]
pub struct AnswerState {
    phase: StreamPhase,
    pub answer: String,
    pub usage: Option<(u32, u32)>,
    pub error: Option<String>,
}

impl AnswerState {
    pub fn new() -> Self {
        Self {
            phase: StreamPhase::Idle,
            answer: String::new(),
            usage: None,
            error: None,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// The request went out
    pub fn start(&mut self) {
        self.phase = StreamPhase::AwaitingFirstChunk;
    }

    /// Apply one event; returns true when the rendered answer changed.
    /// The first token moves `AwaitingFirstChunk -> Streaming` exactly once.
    pub fn apply(&mut self, event: &ChatEvent) -> bool {
        match event {
            ChatEvent::Token(token) => {
                if self.phase == StreamPhase::AwaitingFirstChunk {
                    self.phase = StreamPhase::Streaming;
                }
                self.answer.push_str(token);
                true
            }
            ChatEvent::Usage { sent, received } => {
                self.usage = Some((*sent, *received));
                false
            }
            ChatEvent::Error(message) => {
                self.error = Some(message.clone());
                false
            }
        }
    }

    /// Reader finished; the answer rendered so far is the answer
    pub fn finalize(&mut self) {
        self.phase = StreamPhase::Finalized;
    }

    /// The transport failed. Reachable from any phase; already-rendered
    /// content is kept.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.phase = StreamPhase::Error;
        self.error = Some(message.into());
    }
}

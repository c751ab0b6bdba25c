//! SSE framing of the token sequence
//!
//! One `data:` line per token event, blank-line delimited. Usage metadata,
//! when enabled, goes out as a separate object carrying a `tokens` field so
//! the widget can tell it apart from token events. The literal
//! `data: [DONE]` line closes every stream, including failed ones.

use std::convert::Infallible;

use futures_util::{Stream, StreamExt};
use tracing::warn;

use studi_core::TokenStream;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

const AVG_CHARS_PER_TOKEN: f64 = 4.0;

pub fn token_frame(token: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "token": token }))
}

pub fn usage_frame(sent: u32, received: u32) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "tokens": { "sent": sent, "received": received } })
    )
}

pub fn error_frame(message: &str) -> String {
    format!("data: {}\n\n", serde_json::json!({ "error": message }))
}

/// Rough token count: average chars per token, adjusted by word count
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    let words = text.split_whitespace().count() as f64;
    (chars / AVG_CHARS_PER_TOKEN + words / 2.0).ceil() as u32
}

enum RelayState {
    Streaming { tokens: TokenStream, text: String },
    Usage { text: String },
    Done,
    Closed,
}

/// Drive the token sequence to completion, framing each event for the wire.
///
/// A vendor error mid-stream becomes a user-visible error event followed by
/// the done marker; tokens already relayed are not withdrawn. `sent_tokens`
/// is the prompt-side estimate when usage display is enabled.
pub fn relay_frames(
    tokens: TokenStream,
    sent_tokens: Option<u32>,
) -> impl Stream<Item = Result<String, Infallible>> + Send {
    let state = RelayState::Streaming {
        tokens,
        text: String::new(),
    };
    futures_util::stream::unfold(state, move |mut state| async move {
        loop {
            match state {
                RelayState::Streaming { mut tokens, mut text } => match tokens.next().await {
                    Some(Ok(event)) => {
                        text.push_str(&event.token);
                        let frame = token_frame(&event.token);
                        return Some((Ok(frame), RelayState::Streaming { tokens, text }));
                    }
                    Some(Err(e)) => {
                        warn!("vendor stream failed mid-sequence: {e}");
                        return Some((Ok(error_frame(&e.to_string())), RelayState::Done));
                    }
                    None => {
                        state = if sent_tokens.is_some() {
                            RelayState::Usage { text }
                        } else {
                            RelayState::Done
                        };
                    }
                },
                RelayState::Usage { text } => {
                    let sent = sent_tokens.unwrap_or(0);
                    let frame = usage_frame(sent, estimate_tokens(&text));
                    return Some((Ok(frame), RelayState::Done));
                }
                RelayState::Done => {
                    return Some((Ok(DONE_FRAME.to_string()), RelayState::Closed));
                }
                RelayState::Closed => return None,
            }
        }
    })
}

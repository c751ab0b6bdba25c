//! Server-sent-event wire decoding shared by the vendor adapters
//!
//! All three vendors stream completions as SSE over a chunked HTTP body.
//! [`decode_sse`] reassembles arbitrary byte chunks into whole events;
//! [`token_events`] lifts a per-vendor extraction function over the decoded
//! events into the lazy token sequence the facade hands to its callers.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::Result;
use crate::providers::types::{TokenEvent, TokenStream};

#[derive(Debug)]
pub(crate) enum SseEvent {
    Data(String),
    /// Comment or bare `event:` line with no data payload
    Other,
}

/// What a vendor extraction function made of one data payload
#[derive(Debug)]
pub(crate) enum Extracted {
    Token(String),
    /// Empty delta or control chunk. Skipped silently, no event, no error.
    Skip,
    /// Vendor end marker; the sequence stops here.
    End,
}

/// Decode a raw byte stream into SSE events. Events are delimited by a blank
/// line; a chunk boundary may fall anywhere, so a partial tail is buffered
/// until the rest arrives.
pub(crate) fn decode_sse<S>(bytes_stream: S) -> impl Stream<Item = Result<SseEvent>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    futures_util::stream::unfold(
        (bytes_stream, String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(idx) = buffer.find("\n\n") {
                    let raw = buffer[..idx].to_string();
                    buffer = buffer[idx + 2..].to_string();

                    let mut data_lines = Vec::new();
                    for line in raw.lines() {
                        let line = line.trim_end();
                        if let Some(rest) = line.strip_prefix("data:") {
                            data_lines.push(rest.trim_start().to_string());
                        }
                    }
                    if data_lines.is_empty() {
                        return Some((Ok(SseEvent::Other), (stream, buffer)));
                    }
                    return Some((Ok(SseEvent::Data(data_lines.join("\n"))), (stream, buffer)));
                }

                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        continue;
                    }
                    Some(Err(e)) => return Some((Err(e), (stream, buffer))),
                    None => return None,
                }
            }
        },
    )
}

/// Turn decoded SSE events into a lazy, single-pass token sequence.
///
/// `extract` inspects one data payload and either yields a token, skips the
/// chunk, or ends the sequence. Extraction errors surface to the iterator;
/// tokens already emitted stand.
pub(crate) fn token_events<S, F>(sse: S, extract: F) -> TokenStream
where
    S: Stream<Item = Result<SseEvent>> + Send + 'static,
    F: Fn(&str) -> Result<Extracted> + Send + 'static,
{
    let stream = futures_util::stream::unfold(
        (Box::pin(sse), extract),
        |(mut sse, extract)| async move {
            loop {
                match sse.as_mut().next().await? {
                    Ok(SseEvent::Data(data)) => match extract(&data) {
                        Ok(Extracted::Token(token)) => {
                            return Some((Ok(TokenEvent { token }), (sse, extract)));
                        }
                        Ok(Extracted::Skip) => continue,
                        Ok(Extracted::End) => return None,
                        Err(e) => return Some((Err(e), (sse, extract))),
                    },
                    Ok(SseEvent::Other) => continue,
                    Err(e) => return Some((Err(e), (sse, extract))),
                }
            }
        },
    );
    Box::pin(stream)
}

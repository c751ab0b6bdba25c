//! Interactive chat against the gateway — the terminal counterpart of the
//! web widget

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::style::Stylize;
use crossterm::{cursor, queue, terminal};
use futures_util::StreamExt;

use studi_core::Message;

use crate::render::{LiveRegion, render_markdown};
use crate::stream::{AnswerState, SseFrameDecoder, StreamPhase, parse_event};

pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// One request/answer turn. Renders the answer incrementally and
    /// returns the final state, partial content included on failure.
    pub async fn stream_turn(
        &self,
        history: &[Message],
        prompt: &str,
        out: &mut impl Write,
    ) -> Result<AnswerState> {
        let mut state = AnswerState::new();
        state.start();

        // Typing indicator until the first token lands
        write!(out, "{}", "…".dark_grey())?;
        out.flush()?;

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&serde_json::json!({ "messages": history, "prompt": prompt }))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                clear_indicator(out)?;
                state.fail(e.to_string());
                print_error(out, &state)?;
                return Ok(state);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            clear_indicator(out)?;
            state.fail(format!("gateway error {status}: {body}"));
            print_error(out, &state)?;
            return Ok(state);
        }

        let mut region = LiveRegion::new();
        let mut decoder = SseFrameDecoder::new();
        let mut bytes = response.bytes_stream();

        loop {
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    for raw in decoder.push(&chunk) {
                        apply_raw_event(&raw, &mut state, &mut region, out)?;
                    }
                }
                Some(Err(e)) => {
                    // Interrupted mid-stream; keep what was rendered
                    state.fail(e.to_string());
                    break;
                }
                None => break,
            }
        }

        if let Some(tail) = decoder.finish() {
            apply_raw_event(&tail, &mut state, &mut region, out)?;
        }

        if state.phase() == StreamPhase::AwaitingFirstChunk {
            // Stream ended before any token
            clear_indicator(out)?;
        }

        if state.phase() == StreamPhase::Error {
            print_error(out, &state)?;
        } else {
            state.finalize();
            if let Some(message) = state.error.clone() {
                // The gateway relayed a vendor failure as a data event
                writeln!(out, "{}", format!("⚠ {message}").red())?;
            }
            writeln!(out, "{}", footer(&state).dark_grey())?;
        }
        out.flush()?;
        Ok(state)
    }
}

fn apply_raw_event(
    raw: &str,
    state: &mut AnswerState,
    region: &mut LiveRegion,
    out: &mut impl Write,
) -> Result<()> {
    for event in parse_event(raw) {
        let was_awaiting = state.phase() == StreamPhase::AwaitingFirstChunk;
        if state.apply(&event) {
            if was_awaiting {
                clear_indicator(out)?;
            }
            region.update(out, &render_markdown(&state.answer))?;
        }
    }
    Ok(())
}

fn clear_indicator(out: &mut impl Write) -> std::io::Result<()> {
    queue!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    out.flush()
}

fn print_error(out: &mut impl Write, state: &AnswerState) -> std::io::Result<()> {
    let message = state.error.as_deref().unwrap_or("connection failed");
    writeln!(out, "{}", format!("⚠ {message}").red())
}

/// Timestamp plus usage metadata once the answer is final
fn footer(state: &AnswerState) -> String {
    let mut parts = vec![Local::now().format("%H:%M").to_string()];
    if let Some((sent, received)) = state.usage {
        parts.push(format!("{sent} sent / {received} received tokens"));
    }
    parts.join(" · ")
}

/// Read-eval loop; an empty line quits
pub async fn run_chat(url: &str) -> Result<()> {
    let client = ChatClient::new(url);
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    let mut history: Vec<Message> = Vec::new();

    println!("studi chat — connected to {url} (empty line quits)");
    loop {
        write!(out, "\n{} ", ">".bold())?;
        out.flush()?;
        let mut line = String::new();
        if stdin
            .read_line(&mut line)
            .context("Failed to read from stdin")?
            == 0
        {
            break;
        }
        let prompt = line.trim();
        if prompt.is_empty() {
            break;
        }

        let state = client.stream_turn(&history, prompt, &mut out).await?;
        if state.phase() == StreamPhase::Finalized && !state.answer.is_empty() {
            history.push(Message::user(prompt));
            history.push(Message::assistant(state.answer.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChatEvent;

    #[test]
    fn test_footer_includes_usage_when_present() {
        let mut state = AnswerState::new();
        state.start();
        state.apply(&ChatEvent::Usage {
            sent: 12,
            received: 34,
        });
        let footer = footer(&state);
        assert!(footer.contains("12 sent / 34 received tokens"));
    }

    #[test]
    fn test_footer_without_usage_is_just_the_timestamp() {
        let state = AnswerState::new();
        assert!(!footer(&state).contains("tokens"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ChatClient::new("http://localhost:8787/");
        assert_eq!(client.base_url, "http://localhost:8787");
    }
}

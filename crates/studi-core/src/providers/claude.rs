//! Anthropic Claude provider

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::config::{self, CompletionOptions};
use crate::error::{Error, Result};
use crate::sse::{self, Extracted};

use super::cache::ClientCache;
use super::types::{ChatCompletions, Completion, Message, Role, TokenStream};

const KEY_VARS: &[&str] = &["AI_CLAUDE_API_KEY", "AI_API_KEY"];
const MODEL_VARS: &[&str] = &["AI_CLAUDE_MODEL", "AI_MODEL"];
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Default)]
pub struct ClaudeProvider {
    cache: ClientCache,
}

impl ClaudeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claude takes the system prompt as a top-level field, not a message
    fn request_body(
        messages: &[Message],
        options: &CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        let wire: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| serde_json::json!({ "role": m.role.to_string(), "content": m.content }))
            .collect();
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut body = serde_json::json!({ "messages": wire });
        if !system.is_empty() {
            body["system"] = serde_json::json!(system.join("\n\n"));
        }
        let model = options
            .model
            .clone()
            .or_else(|| config::env_chain(options.backend, MODEL_VARS));
        if let Some(model) = model {
            body["model"] = serde_json::json!(model);
        }
        if let Some(temperature) = options
            .temperature
            .or_else(|| config::env_f32(options.backend, "AI_TEMPERATURE"))
        {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = options
            .max_tokens
            .or_else(|| config::env_u32(options.backend, "AI_MAX_TOKENS"))
        {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        body
    }

    fn extract_content(body: &str) -> Result<String> {
        let parsed: ClaudeResponse = serde_json::from_str(body)?;
        parsed
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or_else(|| Error::ResponseFormat("claude response missing text block".to_string()))
    }

    /// Only `content_block_delta` events with a `text_delta` carry a token
    fn extract_stream_event(data: &str) -> Result<Extracted> {
        let event: ClaudeStreamEvent = serde_json::from_str(data)
            .map_err(|e| Error::StreamParse(format!("claude event: {e} data={data}")))?;
        if event.kind != "content_block_delta" {
            return Ok(Extracted::Skip);
        }
        let token = event
            .delta
            .filter(|d| d.kind.as_deref() == Some("text_delta"))
            .and_then(|d| d.text)
            .filter(|t| !t.is_empty());
        Ok(match token {
            Some(token) => Extracted::Token(token),
            None => Extracted::Skip,
        })
    }
}

#[async_trait]
impl ChatCompletions for ClaudeProvider {
    fn provider_name(&self) -> &str {
        "claude"
    }

    async fn chat_completion(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let client = self
            .cache
            .get(options.api_key.as_deref(), options.backend, KEY_VARS)?;
        let body = Self::request_body(messages, options, false);

        debug!("claude request: messages={}", messages.len());

        let response = client
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", client.api_key())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Vendor {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(Completion {
            content: Self::extract_content(&text)?,
        })
    }

    async fn chat_completion_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TokenStream> {
        let client = self
            .cache
            .get(options.api_key.as_deref(), options.backend, KEY_VARS)?;
        let body = Self::request_body(messages, options, true);

        debug!("claude stream request: messages={}", messages.len());

        let response = client
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", client.api_key())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Vendor {
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = response.bytes_stream().map_err(Error::from);
        Ok(sse::token_events(
            sse::decode_sse(Box::pin(bytes)),
            Self::extract_stream_event,
        ))
    }
}

// ── wire types ──

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<ClaudeStreamDelta>,
}

#[derive(Debug, Deserialize)]
struct ClaudeStreamDelta {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::tests::chunked;
    use futures_util::StreamExt;

    #[test]
    fn test_extract_content_from_envelope() {
        let body = r#"{"id":"msg_1","content":[{"type":"text","text":"Gruss aus Dresden"}],"stop_reason":"end_turn"}"#;
        assert_eq!(
            ClaudeProvider::extract_content(body).unwrap(),
            "Gruss aus Dresden"
        );
    }

    #[test]
    fn test_extract_content_missing_text() {
        let err = ClaudeProvider::extract_content(r#"{"content":[]}"#).unwrap_err();
        assert!(matches!(err, Error::ResponseFormat(_)));
    }

    #[test]
    fn test_stream_event_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hal"}}"#;
        assert!(
            matches!(ClaudeProvider::extract_stream_event(data).unwrap(), Extracted::Token(t) if t == "Hal")
        );
    }

    #[test]
    fn test_stream_event_other_types_skipped() {
        for data in [
            r#"{"type":"ping"}"#,
            r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{}"}}"#,
            r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":""}}"#,
            r#"{"type":"message_stop"}"#,
        ] {
            assert!(matches!(
                ClaudeProvider::extract_stream_event(data).unwrap(),
                Extracted::Skip
            ));
        }
    }

    #[test]
    fn test_stream_event_malformed_errors() {
        let err = ClaudeProvider::extract_stream_event("{not json}").unwrap_err();
        assert!(matches!(err, Error::StreamParse(_)));
    }

    #[test]
    fn test_request_body_lifts_system_prompt() {
        let messages = [
            Message::system("You are the campus assistant."),
            Message::user("Wann hat die Mensa offen?"),
            Message::assistant("Bis 15 Uhr."),
        ];
        let body = ClaudeProvider::request_body(&messages, &CompletionOptions::default(), false);
        assert_eq!(body["system"], "You are the campus assistant.");
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[tokio::test]
    async fn test_stream_concat_matches_single_shot() {
        let whole = r#"{"content":[{"type":"text","text":"Hello world"}]}"#;
        let sse_body = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
            "event: ping\ndata: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\" world\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        let (a, rest) = sse_body.split_at(71);
        let (b, c) = rest.split_at(40);
        let stream = sse::token_events(
            sse::decode_sse(chunked(&[a, b, c])),
            ClaudeProvider::extract_stream_event,
        );
        let streamed: String = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|ev| ev.unwrap().token)
            .collect();
        assert_eq!(streamed, ClaudeProvider::extract_content(whole).unwrap());
    }
}

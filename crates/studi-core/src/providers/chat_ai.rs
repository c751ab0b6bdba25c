//! Academic-cloud chat endpoint (OpenAI-compatible wire format)

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::config::{self, CompletionOptions};
use crate::error::{Error, Result};
use crate::sse::{self, Extracted};

use super::cache::ClientCache;
use super::types::{ChatCompletions, Completion, Message, TokenStream};

const KEY_VARS: &[&str] = &["AI_API_KEY"];
const MODEL_VARS: &[&str] = &["AI_MODEL"];
const DEFAULT_BASE_URL: &str = "https://chat-ai.academiccloud.de/v1";

/// Generic OpenAI-compatible provider, pointed at the academic cloud by
/// default; `AI_BASE_URL` redirects it to any compatible endpoint.
#[derive(Debug, Default)]
pub struct ChatAiProvider {
    cache: ClientCache,
}

impl ChatAiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn request_body(
        messages: &[Message],
        options: &CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        let wire: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.to_string(), "content": m.content }))
            .collect();

        let mut body = serde_json::json!({ "messages": wire });
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

    fn completions_url(backend: bool) -> String {
        let base = config::env_chain(backend, &["AI_BASE_URL"])
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    fn extract_content(body: &str) -> Result<String> {
        let parsed: ChatAiResponse = serde_json::from_str(body)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::ResponseFormat("chat-ai response missing choices".to_string()))?;
        Ok(choice.message.content.unwrap_or_default())
    }

    fn extract_stream_chunk(data: &str) -> Result<Extracted> {
        if data.trim() == "[DONE]" {
            return Ok(Extracted::End);
        }
        let chunk: ChatAiStreamChunk = serde_json::from_str(data)
            .map_err(|e| Error::StreamParse(format!("chat-ai chunk: {e} data={data}")))?;
        let token = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|t| !t.is_empty());
        Ok(match token {
            Some(token) => Extracted::Token(token),
            // Absent delta means no token this chunk
            None => Extracted::Skip,
        })
    }
}

#[async_trait]
impl ChatCompletions for ChatAiProvider {
    fn provider_name(&self) -> &str {
        "chatAi"
    }

    async fn chat_completion(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let client = self
            .cache
            .get(options.api_key.as_deref(), options.backend, KEY_VARS)?;
        let url = Self::completions_url(options.backend);
        let body = Self::request_body(messages, options, false);

        debug!("chat-ai request: url={}, messages={}", url, messages.len());

        let response = client
            .http
            .post(&url)
            .bearer_auth(client.api_key())
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
        let url = Self::completions_url(options.backend);
        let body = Self::request_body(messages, options, true);

        debug!(
            "chat-ai stream request: url={}, messages={}",
            url,
            messages.len()
        );

        let response = client
            .http
            .post(&url)
            .bearer_auth(client.api_key())
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
            Self::extract_stream_chunk,
        ))
    }
}

// ── wire types ──

#[derive(Debug, Deserialize)]
struct ChatAiResponse {
    choices: Vec<ChatAiChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatAiChoice {
    message: ChatAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatAiStreamChunk {
    #[serde(default)]
    choices: Vec<ChatAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatAiStreamChoice {
    #[serde(default)]
    delta: ChatAiStreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct ChatAiStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::tests::chunked;
    use futures_util::StreamExt;

    #[test]
    fn test_extract_content_from_envelope() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello there"}}]}"#;
        assert_eq!(ChatAiProvider::extract_content(body).unwrap(), "Hello there");
    }

    #[test]
    fn test_extract_content_missing_choices() {
        let err = ChatAiProvider::extract_content(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, Error::ResponseFormat(_)));
    }

    #[test]
    fn test_stream_chunk_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert!(
            matches!(ChatAiProvider::extract_stream_chunk(data).unwrap(), Extracted::Token(t) if t == "Hel")
        );
    }

    #[test]
    fn test_stream_chunk_empty_delta_is_skipped() {
        for data in [
            r#"{"choices":[{"delta":{}}]}"#,
            r#"{"choices":[{"delta":{"content":""}}]}"#,
            r#"{"choices":[]}"#,
        ] {
            assert!(matches!(
                ChatAiProvider::extract_stream_chunk(data).unwrap(),
                Extracted::Skip
            ));
        }
    }

    #[test]
    fn test_stream_chunk_done_marker() {
        assert!(matches!(
            ChatAiProvider::extract_stream_chunk("[DONE]").unwrap(),
            Extracted::End
        ));
    }

    #[test]
    fn test_stream_chunk_malformed_errors() {
        let err = ChatAiProvider::extract_stream_chunk("{not json}").unwrap_err();
        assert!(matches!(err, Error::StreamParse(_)));
    }

    #[test]
    fn test_request_body_omits_unset_options() {
        let body = ChatAiProvider::request_body(
            &[Message::user("hi")],
            &CompletionOptions::default().with_model("llama-3.3-70b"),
            false,
        );
        assert_eq!(body["model"], "llama-3.3-70b");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_request_body_roles_pass_through() {
        let messages = [
            Message::system("rules"),
            Message::user("q"),
            Message::assistant("a"),
        ];
        let body = ChatAiProvider::request_body(&messages, &CompletionOptions::default(), true);
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn test_stream_concat_matches_single_shot() {
        // The same answer, once as a whole envelope and once split into SSE
        // chunks with an arbitrary byte boundary mid-event.
        let whole = r#"{"choices":[{"message":{"content":"Hello world"}}]}"#;
        let sse_body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" wor\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ld\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let (a, b) = sse_body.split_at(37);
        let stream = sse::token_events(
            sse::decode_sse(chunked(&[a, b])),
            ChatAiProvider::extract_stream_chunk,
        );
        let streamed: String = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|ev| ev.unwrap().token)
            .collect();
        assert_eq!(streamed, ChatAiProvider::extract_content(whole).unwrap());
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        // Backend scope is never configured in the test environment
        let provider = ChatAiProvider::new();
        let options = CompletionOptions::default().with_backend(true);
        let err = provider
            .chat_completion(&[Message::user("hi")], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredential { .. }));
        assert!(err.to_string().contains("BACKEND_AI_API_KEY"));
    }
}

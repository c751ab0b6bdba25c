//! Google Gemini provider

use async_trait::async_trait;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::config::{self, CompletionOptions};
use crate::error::{Error, Result};
use crate::sse::{self, Extracted};

use super::cache::ClientCache;
use super::types::{ChatCompletions, Completion, Message, Role, TokenStream};

const KEY_VARS: &[&str] = &["AI_GOOGLE_API_KEY", "AI_API_KEY"];
const MODEL_VARS: &[&str] = &["AI_GOOGLE_MODEL", "AI_MODEL"];
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Default)]
pub struct GoogleProvider {
    cache: ClientCache,
}

impl GoogleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve_model(options: &CompletionOptions) -> String {
        options
            .model
            .clone()
            .or_else(|| config::env_chain(options.backend, MODEL_VARS))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// Gemini knows two roles: everything the model said is "model",
    /// everything else is "user"
    fn request_body(messages: &[Message], options: &CompletionOptions) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = options
            .temperature
            .or_else(|| config::env_f32(options.backend, "AI_TEMPERATURE"))
        {
            generation_config.insert("temperature".to_string(), serde_json::json!(temperature));
        }
        if let Some(max_tokens) = options
            .max_tokens
            .or_else(|| config::env_u32(options.backend, "AI_MAX_TOKENS"))
        {
            generation_config.insert("maxOutputTokens".to_string(), serde_json::json!(max_tokens));
        }

        let mut body = serde_json::json!({ "contents": contents });
        if !generation_config.is_empty() {
            body["generationConfig"] = serde_json::Value::Object(generation_config);
        }
        body
    }

    fn extract_content(body: &str) -> Result<String> {
        let parsed: GoogleResponse = serde_json::from_str(body)?;
        if parsed.candidates.is_empty() {
            return Err(Error::ResponseFormat(
                "gemini response had no candidates".to_string(),
            ));
        }
        Ok(parsed.text())
    }

    fn extract_stream_chunk(data: &str) -> Result<Extracted> {
        let chunk: GoogleResponse = serde_json::from_str(data)
            .map_err(|e| Error::StreamParse(format!("gemini chunk: {e} data={data}")))?;
        let token = chunk.text();
        Ok(if token.is_empty() {
            Extracted::Skip
        } else {
            Extracted::Token(token)
        })
    }
}

#[async_trait]
impl ChatCompletions for GoogleProvider {
    fn provider_name(&self) -> &str {
        "google"
    }

    async fn chat_completion(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        let client = self
            .cache
            .get(options.api_key.as_deref(), options.backend, KEY_VARS)?;
        let model = Self::resolve_model(options);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            BASE_URL,
            model,
            client.api_key()
        );
        let body = Self::request_body(messages, options);

        debug!("gemini request: model={}, messages={}", model, messages.len());

        let response = client
            .http
            .post(&url)
            .header("Content-Type", "application/json")
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
        let model = Self::resolve_model(options);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            BASE_URL,
            model,
            client.api_key()
        );
        let body = Self::request_body(messages, options);

        debug!(
            "gemini stream request: model={}, messages={}",
            model,
            messages.len()
        );

        let response = client
            .http
            .post(&url)
            .header("Content-Type", "application/json")
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
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

impl GoogleResponse {
    /// Concatenated text of the first candidate's parts
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct GoogleCandidate {
    #[serde(default)]
    content: GoogleContent,
}

#[derive(Debug, Deserialize, Default)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Deserialize)]
struct GooglePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::tests::chunked;
    use futures_util::StreamExt;

    fn chunk_json(text: &str) -> String {
        format!(
            r#"{{"candidates":[{{"content":{{"role":"model","parts":[{{"text":"{text}"}}]}}}}]}}"#
        )
    }

    #[test]
    fn test_extract_content_concatenates_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"HTW"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(GoogleProvider::extract_content(body).unwrap(), "Hello HTW");
    }

    #[test]
    fn test_extract_content_no_candidates() {
        let err = GoogleProvider::extract_content(r#"{"candidates":[]}"#).unwrap_err();
        assert!(matches!(err, Error::ResponseFormat(_)));
    }

    #[test]
    fn test_assistant_role_becomes_model() {
        let messages = [
            Message::system("sys"),
            Message::user("q"),
            Message::assistant("a"),
        ];
        let body = GoogleProvider::request_body(&messages, &CompletionOptions::default());
        let roles: Vec<&str> = body["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        // Everything that is not assistant output goes over as "user"
        assert_eq!(roles, vec!["user", "user", "model"]);
    }

    #[test]
    fn test_generation_config_only_when_set() {
        let body = GoogleProvider::request_body(
            &[Message::user("q")],
            &CompletionOptions::default().with_temperature(0.2).with_max_tokens(512),
        );
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.2).abs() < 1e-6);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn test_empty_chunk_is_skipped() {
        for data in [
            chunk_json("").as_str(),
            r#"{"candidates":[]}"#,
            r#"{"usageMetadata":{"promptTokenCount":7}}"#,
        ] {
            assert!(matches!(
                GoogleProvider::extract_stream_chunk(data).unwrap(),
                Extracted::Skip
            ));
        }
    }

    #[tokio::test]
    async fn test_stream_skips_empty_chunks() {
        // Three vendor chunks; the empty one produces no token event
        let sse_body = format!(
            "data: {}\n\ndata: {}\n\ndata: {}\n\n",
            chunk_json("Hel"),
            chunk_json("lo"),
            chunk_json("")
        );
        let stream = sse::token_events(
            sse::decode_sse(chunked(&[&sse_body])),
            GoogleProvider::extract_stream_chunk,
        );
        let tokens: Vec<String> = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|ev| ev.unwrap().token)
            .collect();
        assert_eq!(tokens, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_stream_concat_matches_single_shot() {
        let whole = r#"{"candidates":[{"content":{"parts":[{"text":"Hello world"}]}}]}"#;
        let sse_body = format!(
            "data: {}\n\ndata: {}\n\n",
            chunk_json("Hello "),
            chunk_json("world")
        );
        let (a, b) = sse_body.split_at(29);
        let stream = sse::token_events(
            sse::decode_sse(chunked(&[a, b])),
            GoogleProvider::extract_stream_chunk,
        );
        let streamed: String = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|ev| ev.unwrap().token)
            .collect();
        assert_eq!(streamed, GoogleProvider::extract_content(whole).unwrap());
    }
}

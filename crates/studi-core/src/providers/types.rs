//! Vendor-neutral types for the chat-completion layer

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::config::CompletionOptions;
use crate::error::Result;

/// One turn in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Message role; the vocabulary is translated per vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Final concatenated text of a non-streaming completion. Vendor-specific
/// metadata is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
}

/// One incremental text fragment from a streaming completion. Emission order
/// is the only ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEvent {
    pub token: String,
}

/// Lazy, single-pass, non-restartable token sequence. Ends when the vendor
/// stream ends; no done sentinel at this layer.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<TokenEvent>> + Send>>;

/// Two-operation contract every vendor adapter implements
#[async_trait]
pub trait ChatCompletions: Send + Sync {
    /// Human-readable vendor name (e.g. "claude", "google")
    fn provider_name(&self) -> &str;

    /// Single non-streaming call; returns only the normalized text
    async fn chat_completion(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion>;

    /// Streaming call; only non-empty text deltas surface as token events
    async fn chat_completion_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TokenStream>;
}

//! Vendor-agnostic entry point for both completion operations
//!
//! Selection is static per deployment (`AI_PROVIDER`) or per construction;
//! it is never inferred from message content. Errors from the chosen
//! adapter pass through unchanged.

use std::str::FromStr;

use crate::config::{self, CompletionOptions};
use crate::error::{Error, Result};

use super::chat_ai::ChatAiProvider;
use super::claude::ClaudeProvider;
use super::google::GoogleProvider;
use super::types::{ChatCompletions, Completion, Message, TokenStream};

/// The configured vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    ChatAi,
    Claude,
    Google,
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chatai" | "chat-ai" | "chat_ai" => Ok(Self::ChatAi),
            "claude" => Ok(Self::Claude),
            "google" => Ok(Self::Google),
            other => Err(Error::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChatAi => write!(f, "chatAi"),
            Self::Claude => write!(f, "claude"),
            Self::Google => write!(f, "google"),
        }
    }
}

/// Routes both operations to the adapter for the configured vendor. Owned by
/// the process root and shared across requests; each adapter keeps its own
/// client cache alive for the process lifetime.
pub struct CompletionFacade {
    kind: ProviderKind,
    provider: Box<dyn ChatCompletions>,
}

impl std::fmt::Debug for CompletionFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionFacade")
            .field("kind", &self.kind)
            .finish()
    }
}

impl CompletionFacade {
    pub fn new(kind: ProviderKind) -> Self {
        let provider: Box<dyn ChatCompletions> = match kind {
            ProviderKind::ChatAi => Box::new(ChatAiProvider::new()),
            ProviderKind::Claude => Box::new(ClaudeProvider::new()),
            ProviderKind::Google => Box::new(GoogleProvider::new()),
        };
        Self { kind, provider }
    }

    /// Read the configured vendor from `AI_PROVIDER`
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&config::lookup_env)
    }

    pub(crate) fn from_env_with(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let name = lookup("AI_PROVIDER").ok_or(Error::MissingCredential {
            variable: "AI_PROVIDER".to_string(),
        })?;
        Ok(Self::new(name.parse()?))
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub async fn chat_completion(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion> {
        self.provider.chat_completion(messages, options).await
    }

    pub async fn chat_completion_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TokenStream> {
        self.provider.chat_completion_stream(messages, options).await
    }
}

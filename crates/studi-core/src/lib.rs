//! studi-core - the completion layer of the studi campus chatbot
//!
//! This crate provides:
//! - Chat-completion adapters for three vendors (the academic cloud's
//!   OpenAI-compatible endpoint, Anthropic Claude, Google Gemini)
//! - A shared-client cache with per-call credential override
//! - Environment-driven configuration with a backend scope prefix
//! - A vendor-agnostic facade exposing single-shot and streamed completions

pub mod config;
pub mod error;
pub mod providers;
pub mod sse;

// Re-export main types for convenience
pub use config::CompletionOptions;
pub use error::{Error, Result};
pub use providers::{
    ChatCompletions, Completion, CompletionFacade, Message, ProviderKind, Role, TokenEvent,
    TokenStream,
};

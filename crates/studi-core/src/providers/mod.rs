//! Multi-provider chat-completion layer
//!
//! Three adapters (academic cloud OpenAI-compatible, Anthropic Claude,
//! Google Gemini) implement the [`ChatCompletions`] contract and are
//! selected via [`CompletionFacade`]; callers stay vendor-agnostic.

pub mod cache;
pub mod chat_ai;
pub mod claude;
pub mod facade;
pub mod google;
pub mod types;

pub use cache::ClientHandle;
pub use chat_ai::ChatAiProvider;
pub use claude::ClaudeProvider;
pub use facade::{CompletionFacade, ProviderKind};
pub use google::GoogleProvider;
pub use types::{ChatCompletions, Completion, Message, Role, TokenEvent, TokenStream};

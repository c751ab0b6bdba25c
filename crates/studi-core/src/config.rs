//! Per-call completion options and the environment fallback chain
//!
//! Any option left unset falls back to a process-wide environment variable.
//! Variable names are built from a scope prefix (`BACKEND_` when the call
//! targets the secondary deployment, empty otherwise) and a suffix, with
//! vendor-qualified names (`AI_CLAUDE_MODEL`, `AI_GOOGLE_API_KEY`, ...)
//! checked before the generic ones (`AI_MODEL`, `AI_API_KEY`, ...).

use crate::error::Error;

/// Recognized per-call options; anything omitted resolves from the environment
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Explicit API key override. A call carrying one gets a fresh,
    /// uncached client; it never touches the shared client.
    pub api_key: Option<String>,
    /// Selects the `BACKEND_`-prefixed variable namespace.
    pub backend: bool,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_backend(mut self, backend: bool) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Variable name under the given scope prefix
pub(crate) fn scoped(backend: bool, name: &str) -> String {
    if backend {
        format!("BACKEND_{name}")
    } else {
        name.to_string()
    }
}

/// Prefixed names for an error message, most specific first
pub(crate) fn scoped_names(backend: bool, names: &[&str]) -> Vec<String> {
    names.iter().map(|n| scoped(backend, n)).collect()
}

pub(crate) fn missing_credential(backend: bool, names: &[&str]) -> Error {
    let scoped = scoped_names(backend, names);
    let refs: Vec<&str> = scoped.iter().map(String::as_str).collect();
    Error::missing_credential(&refs)
}

pub(crate) fn lookup_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// First hit along the vendor-qualified-then-generic chain
pub(crate) fn env_chain(backend: bool, names: &[&str]) -> Option<String> {
    env_chain_with(&lookup_env, backend, names)
}

pub(crate) fn env_chain_with(
    lookup: &dyn Fn(&str) -> Option<String>,
    backend: bool,
    names: &[&str],
) -> Option<String> {
    names.iter().find_map(|name| lookup(&scoped(backend, name)))
}

pub(crate) fn env_f32(backend: bool, name: &str) -> Option<f32> {
    env_chain(backend, &[name]).and_then(|v| v.parse().ok())
}

pub(crate) fn env_u32(backend: bool, name: &str) -> Option<u32> {
    env_chain(backend, &[name]).and_then(|v| v.parse().ok())
}

//! Shared-client cache, one per vendor adapter
//!
//! Callers without an explicit key share one handle per credential scope for
//! the process lifetime; it is built on first use and never torn down. An
//! explicit per-call key always gets a fresh handle that is never stored, so
//! request-scoped credentials cannot pollute the shared client.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config;
use crate::error::Result;

/// HTTP client plus the credential it was constructed with
pub struct ClientHandle {
    pub(crate) http: reqwest::Client,
    pub(crate) api_key: String,
}

impl ClientHandle {
    fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client");
        Self { http, api_key }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Mask the API key in debug output
        let masked = if self.api_key.len() > 7 {
            format!(
                "{}...{}",
                &self.api_key[..3],
                &self.api_key[self.api_key.len() - 4..]
            )
        } else {
            "***".to_string()
        };
        f.debug_struct("ClientHandle")
            .field("http", &"<reqwest::Client>")
            .field("api_key", &masked)
            .finish()
    }
}

/// One memoized handle per credential scope. Initialization races are
/// benign: `OnceLock` keeps the first writer, the loser's handle is dropped.
#[derive(Debug, Default)]
pub(crate) struct ClientCache {
    primary: OnceLock<Arc<ClientHandle>>,
    backend: OnceLock<Arc<ClientHandle>>,
}

impl ClientCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Resolve a handle for one call. `key_vars` is the vendor's credential
    /// chain, most specific first.
    pub(crate) fn get(
        &self,
        explicit_key: Option<&str>,
        backend: bool,
        key_vars: &[&str],
    ) -> Result<Arc<ClientHandle>> {
        self.get_with(&config::lookup_env, explicit_key, backend, key_vars)
    }

    pub(crate) fn get_with(
        &self,
        lookup: &dyn Fn(&str) -> Option<String>,
        explicit_key: Option<&str>,
        backend: bool,
        key_vars: &[&str],
    ) -> Result<Arc<ClientHandle>> {
        if let Some(key) = explicit_key {
            // Fresh handle, never stored
            return Ok(Arc::new(ClientHandle::new(key.to_string())));
        }

        let key = config::env_chain_with(lookup, backend, key_vars)
            .ok_or_else(|| config::missing_credential(backend, key_vars))?;

        let slot = if backend { &self.backend } else { &self.primary };
        Ok(Arc::clone(
            slot.get_or_init(|| Arc::new(ClientHandle::new(key))),
        ))
    }
}

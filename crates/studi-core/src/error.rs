//! Error type shared across the provider layer

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No API key (or other required setting) could be resolved. Raised
    /// before any network I/O; the message names the exact variable(s).
    #[error("{variable} environment variable not set")]
    MissingCredential { variable: String },

    #[error("unknown chat provider: {0}")]
    UnknownProvider(String),

    /// The vendor rejected the request. Propagated unchanged to the caller;
    /// no retry, no backoff.
    #[error("vendor request failed with status {status}: {body}")]
    Vendor { status: u16, body: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("stream parse error: {0}")]
    StreamParse(String),
}

impl Error {
    pub(crate) fn missing_credential(variables: &[&str]) -> Self {
        Self::MissingCredential {
            variable: variables.join(" or "),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_names_variables() {
        let err = Error::missing_credential(&["AI_CLAUDE_API_KEY", "AI_API_KEY"]);
        assert_eq!(
            err.to_string(),
            "AI_CLAUDE_API_KEY or AI_API_KEY environment variable not set"
        );
    }

    #[test]
    fn test_missing_credential_single_variable() {
        let err = Error::missing_credential(&["AI_API_KEY"]);
        assert_eq!(err.to_string(), "AI_API_KEY environment variable not set");
    }
}

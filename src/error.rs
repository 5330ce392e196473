//! Error taxonomy of the scoring core.
//!
//! - per-item failures are recovered locally (default package) and only counted;
//! - batch-wide failures (`ProviderError::is_batch_wide`) re-route a sub-batch
//!   to the next provider in the fallback chain;
//! - `AllProvidersExhausted` is surfaced as a warning, never aborts a run;
//! - `Config` is fatal at startup, before any scoring begins.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("rate limit wait exceeded {timeout:?}")]
    RateLimitTimeout { timeout: Duration },

    #[error("all providers exhausted (tried: {tried:?}), {unscored} item(s) left unscored")]
    AllProvidersExhausted { tried: Vec<String>, unscored: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Credentials rejected (401/403) or missing.
    Auth,
    /// Endpoint unreachable, unknown route or invalid URL.
    Endpoint,
    /// Request or batch exceeded its time ceiling.
    Timeout,
    /// Waiting for the local request budget exceeded its ceiling.
    RateLimitWait,
    /// Upstream throttled a single request (429).
    RateLimited,
    /// Upstream 5xx or transport hiccup on a single request.
    Server,
    /// Response was not the JSON object we asked for.
    Malformed,
    /// Upstream refused the content (moderation filters).
    ContentFilter,
}

#[derive(Debug, Clone, Error)]
#[error("{provider}: {kind:?}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Failures that affect every call to this provider, not just one item.
    pub fn is_batch_wide(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Auth
                | ProviderErrorKind::Endpoint
                | ProviderErrorKind::Timeout
                | ProviderErrorKind::RateLimitWait
        )
    }
}

/// Structured-response validation failure for a single item.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` has an invalid value")]
    InvalidField(&'static str),
}

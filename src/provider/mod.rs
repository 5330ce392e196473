//! Provider abstraction: one `call` interface, a closed set of adapters.
//!
//! Adapters are selected by table lookup in [`registry::ProviderRegistry`];
//! nothing else in the crate branches on provider names.

pub mod mock;
pub mod openai;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProviderError;

pub use mock::MockProvider;
pub use openai::OpenAiCompatibleProvider;
pub use registry::{FallbackPolicy, ProviderEntry, ProviderRegistry};

/// One chat round trip: system instructions plus a serialized item description.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_content: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the endpoint for JSON-object response mode.
    pub json_mode: bool,
}

/// Remote model endpoint. Returns the parsed JSON object of the reply.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn call(&self, request: &ChatRequest) -> Result<serde_json::Value, ProviderError>;
    /// Adapter name for diagnostics.
    fn kind(&self) -> &'static str;
}

/// Closed set of adapter implementations a profile can select.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/chat/completions` endpoint (Zhipu, DeepSeek, Gemini, ...).
    #[default]
    OpenaiCompatible,
    /// Deterministic offline adapter.
    Mock,
}

fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_concurrent() -> usize {
    3
}
fn default_batch_size() -> usize {
    10
}
fn default_request_timeout_secs() -> u64 {
    60
}

/// Connection and model settings for one provider. Immutable after load.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Filled from the `[providers.<name>]` table key.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Requests per minute; absent means unlimited.
    #[serde(default)]
    pub rate_limit_rpm: Option<u32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ProviderProfile {
    pub fn new(name: impl Into<String>, kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            endpoint: String::new(),
            api_key: String::new(),
            model: model.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_concurrent: default_max_concurrent(),
            batch_size: default_batch_size(),
            rate_limit_rpm: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Credentials present (or not needed).
    pub fn is_configured(&self) -> bool {
        match self.kind {
            ProviderKind::Mock => true,
            ProviderKind::OpenaiCompatible => !self.api_key.trim().is_empty(),
        }
    }
}

impl fmt::Debug for ProviderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderProfile")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("api_key_len", &self.api_key.len())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("max_concurrent", &self.max_concurrent)
            .field("batch_size", &self.batch_size)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Remove a Markdown code fence wrapped around a JSON reply.
pub fn strip_code_fence(content: &str) -> &str {
    let mut s = content.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string (e.g. "json") up to the first newline.
        s = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches("json"),
        };
        s = s.trim_end();
        s = s.strip_suffix("```").unwrap_or(s);
    }
    s.trim()
}

//! OpenAI-compatible chat adapter (`POST {endpoint}/chat/completions`).
//! Works for every provider exposing the OpenAI wire format.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{strip_code_fence, ChatProvider, ChatRequest, ProviderProfile};
use crate::error::{ProviderError, ProviderErrorKind};

pub struct OpenAiCompatibleProvider {
    name: String,
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    pub fn from_profile(profile: &ProviderProfile) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent("news-digest/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(profile.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| {
                ProviderError::new(&profile.name, ProviderErrorKind::Endpoint, e.to_string())
            })?;
        Ok(Self {
            name: profile.name.clone(),
            http,
            url: completions_url(&profile.endpoint),
            api_key: profile.api_key.clone(),
        })
    }

    fn err(&self, kind: ProviderErrorKind, message: impl Into<String>) -> ProviderError {
        ProviderError::new(&self.name, kind, message)
    }
}

fn completions_url(endpoint: &str) -> String {
    let base = endpoint.trim().trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

/// Map an HTTP status to the failure class the fallback logic acts on.
pub fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        401 | 403 => ProviderErrorKind::Auth,
        404 | 405 => ProviderErrorKind::Endpoint,
        408 | 504 => ProviderErrorKind::Timeout,
        429 => ProviderErrorKind::RateLimited,
        // Moderation rejections come back as 400 on most compatible endpoints.
        400 | 422 => ProviderErrorKind::ContentFilter,
        _ => ProviderErrorKind::Server,
    }
}

fn classify_transport(e: &reqwest::Error) -> ProviderErrorKind {
    if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else if e.is_connect() || e.is_builder() || (e.is_request() && e.url().is_none()) {
        ProviderErrorKind::Endpoint
    } else {
        ProviderErrorKind::Server
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

/// Parse the assistant message into a JSON object.
pub fn parse_content(provider: &str, content: &str) -> Result<serde_json::Value, ProviderError> {
    let body = strip_code_fence(content);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        ProviderError::new(provider, ProviderErrorKind::Malformed, format!("invalid JSON: {e}"))
    })?;
    if !value.is_object() {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::Malformed,
            "reply is not a JSON object",
        ));
    }
    Ok(value)
}

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    async fn call(&self, request: &ChatRequest) -> Result<serde_json::Value, ProviderError> {
        if self.api_key.is_empty() {
            return Err(self.err(ProviderErrorKind::Auth, "missing API key"));
        }

        let req = Req {
            model: &request.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &request.system_prompt,
                },
                Msg {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| self.err(classify_transport(&e), e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(self.err(classify_status(status), format!("HTTP {status}: {snippet}")));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| self.err(ProviderErrorKind::Malformed, e.to_string()))?;
        let content = body
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("");
        if content.trim().is_empty() {
            return Err(self.err(ProviderErrorKind::Malformed, "empty reply"));
        }
        parse_content(&self.name, content)
    }

    fn kind(&self) -> &'static str {
        "openai_compatible"
    }
}

// tests/common/mod.rs
// Shared helpers: a scripted provider adapter, item builders and configs.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use news_digest::config::DigestConfig;
use news_digest::provider::{
    ChatProvider, ChatRequest, FallbackPolicy, MockProvider, ProviderKind, ProviderProfile,
    ProviderRegistry,
};
use news_digest::{NewsItem, ProviderError, ProviderErrorKind};

pub type Script = dyn Fn(&Value) -> Result<Value, ProviderError> + Send + Sync;

/// Adapter whose reply is computed from the request's item JSON.
pub struct ScriptedProvider {
    pub name: String,
    script: Box<Script>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<F>(name: &str, script: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            script: Box::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn call(&self, request: &ChatRequest) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let input: Value = serde_json::from_str(&request.user_content).unwrap_or(Value::Null);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let out = (self.script)(&input);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }

    fn kind(&self) -> &'static str {
        "scripted"
    }
}

pub fn title(input: &Value) -> &str {
    input.get("title").and_then(Value::as_str).unwrap_or("")
}

pub fn task(input: &Value) -> &str {
    input.get("task").and_then(Value::as_str).unwrap_or("")
}

pub fn coarse_reply(category: &str, score: f64) -> Value {
    json!({ "category": category, "score": score })
}

/// All five dimensions set to `x`, so the weighted total is `x` too.
pub fn deep_reply(x: f64) -> Value {
    json!({
        "scores": {
            "importance": x, "timeliness": x, "technical_depth": x,
            "audience_breadth": x, "practicality": x
        },
        "translated_title": "译文标题",
        "summary": "摘要",
        "key_points": ["要点一", "要点二"]
    })
}

pub fn error(provider: &str, kind: ProviderErrorKind) -> ProviderError {
    ProviderError::new(provider, kind, "scripted failure")
}

/// Passes both tasks with a coarse score of 8.0 in `category` and a deep score of `x`.
pub fn happy_script(category: &'static str, x: f64) -> impl Fn(&Value) -> Result<Value, ProviderError> {
    move |input| match task(input) {
        "coarse" => Ok(coarse_reply(category, 8.0)),
        _ => Ok(deep_reply(x)),
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
}

pub fn item(n: usize, title: &str) -> NewsItem {
    NewsItem::new(
        title,
        format!("https://news.example.com/{n}"),
        "Example Wire",
        t0(),
        format!("Body of {title}"),
    )
}

pub fn items(titles: &[&str]) -> Vec<NewsItem> {
    titles.iter().enumerate().map(|(i, t)| item(i, t)).collect()
}

pub fn profile(name: &str, batch_size: usize, max_concurrent: usize) -> ProviderProfile {
    let mut p = ProviderProfile::new(name, ProviderKind::Mock, "test-model");
    p.batch_size = batch_size;
    p.max_concurrent = max_concurrent;
    p
}

pub fn registry_with(providers: Vec<(ProviderProfile, Arc<dyn ChatProvider>)>) -> ProviderRegistry {
    providers
        .into_iter()
        .fold(ProviderRegistry::new(), |reg, (p, a)| reg.with_adapter(p, a))
}

/// Config with mock providers `names` (first is primary) chained in order.
pub fn config(names: &[&str]) -> DigestConfig {
    let mut cfg = DigestConfig::default();
    cfg.scoring.provider = names[0].to_string();
    cfg.scoring.target_items = 30;
    cfg.scoring.batch_timeout_secs = 30;
    cfg.scoring.acquire_timeout_secs = 5;
    cfg.fallback = FallbackPolicy {
        enabled: names.len() > 1,
        chain: names[1..].iter().map(|s| s.to_string()).collect(),
        max_retries: 0,
    };
    cfg.providers = names
        .iter()
        .map(|n| (n.to_string(), profile(n, 10, 3)))
        .collect::<BTreeMap<_, _>>();
    cfg
}

pub fn mock_adapter(name: &str) -> Arc<dyn ChatProvider> {
    Arc::new(MockProvider::new(name))
}

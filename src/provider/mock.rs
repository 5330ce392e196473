//! Deterministic offline adapter. Scores derive from a hash of the item title,
//! so repeated runs over the same input give identical results.

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{ChatProvider, ChatRequest};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::model::Category;

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    name: String,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Map one hash byte onto 4.0..=9.9 with one decimal.
fn score_from(b: u8) -> f64 {
    4.0 + f64::from(b % 60) / 10.0
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn call(&self, request: &ChatRequest) -> Result<Value, ProviderError> {
        let input: Value = serde_json::from_str(&request.user_content).map_err(|e| {
            ProviderError::new(&self.name, ProviderErrorKind::Malformed, e.to_string())
        })?;
        let title = input.get("title").and_then(Value::as_str).unwrap_or("");
        let digest = Sha256::digest(title.as_bytes());

        match input.get("task").and_then(Value::as_str) {
            Some("coarse") => {
                let category = input
                    .get("category_hint")
                    .and_then(Value::as_str)
                    .and_then(Category::from_label)
                    .unwrap_or(Category::ALL[usize::from(digest[0]) % Category::ALL.len()]);
                Ok(json!({
                    "category": category.as_str(),
                    "score": score_from(digest[1]),
                }))
            }
            Some("deep") => Ok(json!({
                "scores": {
                    "importance": score_from(digest[2]),
                    "timeliness": score_from(digest[3]),
                    "technical_depth": score_from(digest[4]),
                    "audience_breadth": score_from(digest[5]),
                    "practicality": score_from(digest[6]),
                },
                "translated_title": title,
                "summary": format!("Summary of: {title}"),
                "key_points": [format!("Key point of: {title}")],
            })),
            other => Err(ProviderError::new(
                &self.name,
                ProviderErrorKind::Malformed,
                format!("unknown task {other:?}"),
            )),
        }
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(content: Value) -> ChatRequest {
        ChatRequest {
            model: "mock".into(),
            system_prompt: String::new(),
            user_content: content.to_string(),
            max_tokens: 100,
            temperature: 0.0,
            json_mode: true,
        }
    }

    #[tokio::test]
    async fn same_title_same_scores() {
        let m = MockProvider::new("mock");
        let a = m
            .call(&req(json!({"task": "deep", "title": "Rates rise"})))
            .await
            .unwrap();
        let b = m
            .call(&req(json!({"task": "deep", "title": "Rates rise"})))
            .await
            .unwrap();
        assert_eq!(a, b);
        let imp = a["scores"]["importance"].as_f64().unwrap();
        assert!((4.0..=9.9).contains(&imp));
    }

    #[tokio::test]
    async fn coarse_respects_category_hint() {
        let m = MockProvider::new("mock");
        let v = m
            .call(&req(json!({"task": "coarse", "title": "x", "category_hint": "tech"})))
            .await
            .unwrap();
        assert_eq!(v["category"], "tech");
    }
}

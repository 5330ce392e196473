// tests/metrics.rs
//
// /metrics exposition after a digest run. The Prometheus recorder is
// process-global, so this binary holds a single test.

mod common;

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::*;
use news_digest::api::{self, AppState};
use news_digest::metrics::Metrics;
use news_digest::provider::ChatProvider;
use news_digest::{DigestPipeline, ProviderErrorKind};

#[tokio::test]
async fn metrics_endpoint_contains_digest_series() {
    let metrics = Metrics::init().expect("install recorder");

    // Primary always fails auth, backup scores: one batch failure, no exhaustion.
    let failing: Arc<dyn ChatProvider> = Arc::new(ScriptedProvider::new("zhipu", |_| {
        Err(error("zhipu", ProviderErrorKind::Auth))
    }));
    let backup: Arc<dyn ChatProvider> =
        Arc::new(ScriptedProvider::new("deepseek", happy_script("tech", 7.5)));
    let registry = registry_with(vec![
        (profile("zhipu", 10, 3), failing),
        (profile("deepseek", 10, 3), backup),
    ]);
    let pipeline =
        DigestPipeline::from_parts(&config(&["zhipu", "deepseek"]), registry).expect("pipeline");
    let app = api::create_router(AppState::new(pipeline)).merge(metrics.router());

    let payload = serde_json::json!({
        "items": [{
            "title": "Quantum error correction milestone",
            "link": "https://news.example.com/q",
            "source": "Example Wire",
            "published_at": "2025-03-01T08:00:00Z",
            "summary": "Logical qubits outlive physical ones."
        }]
    });
    let resp = app
        .clone()
        .oneshot(
            Request::post("/digest")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for series in [
        "digest_items_attempted_total",
        "digest_items_selected_total",
        "digest_provider_batch_failures_total",
        "digest_last_run_ts",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains(r#"provider="zhipu""#));
    assert!(!text.contains(r#"provider="deepseek""#));
}

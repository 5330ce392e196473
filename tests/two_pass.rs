// tests/two_pass.rs
//
// End-to-end runs of the two-pass selector through DigestPipeline:
// - inclusive per-category Pass-1 threshold
// - Pass-1 defaults are never dropped
// - idempotent re-scoring with a deterministic adapter
// - quota shares of the final output
// - startup configuration errors
// - score cache hits skip the provider

mod common;

use std::sync::Arc;

use serde_json::Value;

use common::*;
use news_digest::provider::ChatProvider;
use news_digest::{score_and_select, Category, DigestPipeline, ProviderError, ScoringError};

fn scripted(
    name: &str,
    f: impl Fn(&Value) -> Result<Value, ProviderError> + Send + Sync + 'static,
) -> (Arc<ScriptedProvider>, news_digest::provider::ProviderRegistry) {
    let p = Arc::new(ScriptedProvider::new(name, f));
    let adapter: Arc<dyn ChatProvider> = p.clone();
    (p, registry_with(vec![(profile(name, 10, 3), adapter)]))
}

#[tokio::test]
async fn score_exactly_at_threshold_survives() {
    // tech threshold is 6.0 by default.
    let (_, registry) = scripted("zhipu", |input| match task(input) {
        "coarse" => Ok(match title(input) {
            "at" => coarse_reply("tech", 6.0),
            "below" => coarse_reply("tech", 5.99),
            _ => coarse_reply("tech", 9.0),
        }),
        _ => Ok(deep_reply(7.0)),
    });
    let pipeline = DigestPipeline::from_parts(&config(&["zhipu"]), registry).unwrap();

    let run = pipeline.run(items(&["at", "below", "above"])).await;

    let titles: Vec<&str> = run.items.iter().map(|i| i.title.as_str()).collect();
    assert!(titles.contains(&"at"));
    assert!(titles.contains(&"above"));
    assert!(!titles.contains(&"below"));
    assert_eq!(run.diagnostics.pass1_survivors, 2);
    assert_eq!(run.diagnostics.pass1_dropped, 1);
}

#[tokio::test]
async fn thresholds_are_per_category() {
    // 5.7 passes finance (5.5) but not tech (6.0).
    let (_, registry) = scripted("zhipu", |input| match task(input) {
        "coarse" => Ok(match title(input) {
            "money" => coarse_reply("finance", 5.7),
            _ => coarse_reply("tech", 5.7),
        }),
        _ => Ok(deep_reply(7.0)),
    });
    let pipeline = DigestPipeline::from_parts(&config(&["zhipu"]), registry).unwrap();

    let run = pipeline.run(items(&["money", "gadget"])).await;
    assert_eq!(run.items.len(), 1);
    assert_eq!(run.items[0].title, "money");
    assert_eq!(run.items[0].score.category, Some(Category::Finance));
}

#[tokio::test]
async fn pass1_failures_go_on_to_pass2() {
    let (_, registry) = scripted("zhipu", |input| match (task(input), title(input)) {
        ("coarse", "broken") => Ok(serde_json::json!({ "nonsense": true })),
        ("coarse", _) => Ok(coarse_reply("finance", 8.0)),
        _ => Ok(deep_reply(6.5)),
    });
    let pipeline = DigestPipeline::from_parts(&config(&["zhipu"]), registry).unwrap();

    let run = pipeline.run(items(&["fine", "broken"])).await;

    assert_eq!(run.items.len(), 2);
    let broken = run.items.iter().find(|i| i.title == "broken").unwrap();
    // Pass 2 succeeded, so the item is no longer defaulted.
    assert!(!broken.score.defaulted);
    assert!((broken.total_score() - 6.5).abs() < 1e-9);
    assert_eq!(run.diagnostics.item_failures, 1);
    assert_eq!(run.diagnostics.defaulted, 0);
}

#[tokio::test]
async fn rescoring_is_idempotent() {
    let cfg = config(&["mock"]);
    let registry = registry_with(vec![(profile("mock", 4, 2), mock_adapter("mock"))]);
    let pipeline = DigestPipeline::from_parts(&cfg, registry).unwrap();

    let input = items(&[
        "Central bank holds rates",
        "New GPU architecture announced",
        "Parliament passes budget",
        "Quantum error correction milestone",
        "Oil prices slide",
    ]);
    let first = pipeline.run_with_target(input, 100).await;
    let second = pipeline.run_with_target(first.items.clone(), 100).await;

    let key = |run: &news_digest::DigestRun| {
        let mut v: Vec<(String, Option<Category>, f64)> = run
            .items
            .iter()
            .map(|i| (i.id.clone(), i.score.category, i.total_score()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    };
    assert_eq!(key(&first), key(&second));
}

#[tokio::test]
async fn final_output_follows_quotas_and_ranking() {
    // 20 items per category, all above threshold; N = 10 -> 4/3/3.
    let (_, registry) = scripted("zhipu", |input| {
        let t = title(input);
        let category = t.split('-').next().unwrap_or("politics").to_string();
        let n: f64 = t.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        match task(input) {
            "coarse" => Ok(coarse_reply(&category, 9.0)),
            _ => Ok(deep_reply(n / 10.0)),
        }
    });
    let mut cfg = config(&["zhipu"]);
    cfg.scoring.target_items = 10;
    let pipeline = DigestPipeline::from_parts(&cfg, registry).unwrap();

    let titles: Vec<String> = ["finance", "tech", "politics"]
        .iter()
        .flat_map(|c| (0..20).map(move |n| format!("{c}-{n}")))
        .collect();
    let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
    let run = pipeline.run(items(&refs)).await;

    assert_eq!(run.items.len(), 10);
    let count = |c| run.items.iter().filter(|i| i.score.category == Some(c)).count();
    assert_eq!(count(Category::Finance), 4);
    assert_eq!(count(Category::Tech), 3);
    assert_eq!(count(Category::Politics), 3);

    // Ranked by total, highest first; each category kept its best items.
    let totals: Vec<f64> = run.items.iter().map(|i| i.total_score()).collect();
    assert!(totals.windows(2).all(|w| w[0] >= w[1]));
    assert!(run.items.iter().all(|i| i.total_score() >= 1.6 - 1e-6));
}

#[tokio::test]
async fn unknown_primary_fails_before_scoring() {
    let mut cfg = config(&["zhipu"]);
    cfg.scoring.provider = "openai".into();
    let err = score_and_select(items(&["a"]), &cfg).await.unwrap_err();
    assert!(matches!(err, ScoringError::Config(_)));
}

#[tokio::test]
async fn enabled_fallback_with_empty_chain_fails_before_scoring() {
    let mut cfg = config(&["zhipu", "deepseek"]);
    cfg.fallback.chain.clear();
    let registry = registry_with(vec![(profile("zhipu", 10, 3), mock_adapter("zhipu"))]);
    assert!(matches!(
        DigestPipeline::from_parts(&cfg, registry),
        Err(ScoringError::Config(_))
    ));
}

#[tokio::test]
async fn score_and_select_runs_with_mock_profiles() {
    let run = score_and_select(items(&["a", "b", "c"]), &config(&["zhipu", "deepseek"]))
        .await
        .unwrap();
    assert_eq!(run.diagnostics.attempted, 3);
    assert_eq!(run.diagnostics.providers_used, vec!["zhipu"]);
    assert!(run.items.len() <= 3);
}

#[tokio::test]
async fn cache_hits_skip_the_provider() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&["zhipu"]);
    cfg.cache.enabled = true;
    cfg.cache.dir = dir.path().to_path_buf();

    let provider = Arc::new(ScriptedProvider::new("zhipu", happy_script("finance", 8.0)));
    let adapter: Arc<dyn ChatProvider> = provider.clone();
    let pipeline = DigestPipeline::from_parts(
        &cfg,
        registry_with(vec![(profile("zhipu", 10, 3), adapter)]),
    )
    .unwrap();

    let first = pipeline.run(items(&["a", "b"])).await;
    assert_eq!(first.diagnostics.cache_hits, 0);
    assert_eq!(provider.calls(), 4); // 2 coarse + 2 deep

    let second = pipeline.run(items(&["a", "b"])).await;
    assert_eq!(second.diagnostics.cache_hits, 2);
    assert_eq!(provider.calls(), 6); // coarse only
    assert_eq!(
        second.items.iter().map(|i| i.total_score()).collect::<Vec<_>>(),
        first.items.iter().map(|i| i.total_score()).collect::<Vec<_>>()
    );
}

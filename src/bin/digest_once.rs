//! One-shot run: fetch the configured feeds, skip items published by earlier
//! runs, score and select, print the digest as JSON, then persist history.

use anyhow::Context;
use chrono::Utc;
use news_digest::history::{RunHistory, RunRecord};
use news_digest::ingest::{collect_items, ItemSource, RssFeedSource};
use news_digest::{DigestConfig, DigestPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    news_digest::init_tracing();

    let config = DigestConfig::load().context("load digest config")?;
    let pipeline = DigestPipeline::from_config(&config).context("build digest pipeline")?;

    let mut sources: Vec<Box<dyn ItemSource>> = Vec::with_capacity(config.feeds.len());
    for feed in &config.feeds {
        match RssFeedSource::from_feed_config(feed) {
            Ok(s) => sources.push(Box::new(s)),
            Err(e) => tracing::warn!(target: "ingest", feed = %feed.name, error = ?e, "feed skipped"),
        }
    }

    let mut history = RunHistory::load(&config.history)?;
    let items = collect_items(&sources, Some(&history)).await;
    let run = pipeline.run(items).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&run).context("serialize digest")?
    );

    history.mark_seen(run.items.iter().map(|it| it.id.as_str()));
    history.record_run(RunRecord::from_diagnostics(&run.diagnostics, Utc::now()));
    history.save()?;
    Ok(())
}

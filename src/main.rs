//! News digest service binary entrypoint.
//! Loads the digest config, builds the scoring pipeline and serves the HTTP API.

use anyhow::Context;
use news_digest::{api, metrics::Metrics, DigestConfig, DigestPipeline};
use tracing::info;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    news_digest::init_tracing();

    let config = DigestConfig::load().context("load digest config")?;
    let pipeline = DigestPipeline::from_config(&config).context("build digest pipeline")?;

    let metrics = Metrics::init().context("install prometheus recorder")?;
    let router = api::create_router(api::AppState::new(pipeline)).merge(metrics.router());

    let addr = std::env::var("DIGEST_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(target: "api", %addr, "listening");

    axum::serve(listener, router).await.context("http server")?;
    Ok(())
}

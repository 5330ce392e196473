// src/lib.rs
// Public library surface for the service binary, the one-shot binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod ratelimit;
pub mod scoring;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::config::DigestConfig;
pub use crate::error::{ProviderError, ProviderErrorKind, ScoringError};
pub use crate::model::{Category, NewsItem, ScoreCard, ScoringCriteria};
pub use crate::pipeline::{score_and_select, DigestPipeline};
pub use crate::scoring::{DigestRun, RunDiagnostics};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber for a binary. `RUST_LOG` wins over
/// the default filter; `DIGEST_LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_digest=info,warn"));
    let json = std::env::var("DIGEST_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if let Err(e) = res {
        eprintln!("tracing already initialized: {e}");
    }
}

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::model::NewsItem;
use crate::pipeline::DigestPipeline;
use crate::scoring::DigestRun;

/// Upper bound on items accepted by one `/digest` request.
pub const MAX_ITEMS_PER_REQUEST: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<DigestPipeline>,
}

impl AppState {
    pub fn new(pipeline: DigestPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/chain", get(chain))
        .route("/digest", post(digest))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DigestReq {
    items: Vec<NewsItem>,
    /// Overrides the configured output size.
    #[serde(default)]
    target: Option<usize>,
}

#[derive(Serialize)]
struct ErrorResp {
    error: String,
}

async fn digest(
    State(state): State<AppState>,
    Json(body): Json<DigestReq>,
) -> Result<Json<DigestRun>, (StatusCode, Json<ErrorResp>)> {
    if body.items.len() > MAX_ITEMS_PER_REQUEST {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResp {
                error: format!("at most {MAX_ITEMS_PER_REQUEST} items per request"),
            }),
        ));
    }
    // More slots than the request can carry select nothing extra.
    let target = body
        .target
        .unwrap_or_else(|| state.pipeline.target_items())
        .min(MAX_ITEMS_PER_REQUEST);
    info!(target: "api", items = body.items.len(), target, "digest requested");
    let run = state.pipeline.run_with_target(body.items, target).await;
    Ok(Json(run))
}

#[derive(Serialize)]
struct ChainResp {
    chain: Vec<String>,
    target_items: usize,
}

async fn chain(State(state): State<AppState>) -> Json<ChainResp> {
    Json(ChainResp {
        chain: state.pipeline.chain().to_vec(),
        target_items: state.pipeline.target_items(),
    })
}

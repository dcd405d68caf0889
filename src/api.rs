//! # HTTP API
//! Two research entry points over the same engine: `/research/batch`
//! returns the full response once the run finishes, and
//! `/research/batch/stream` frames the run as Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::analyze::SharedAnalyzer;
use crate::cache::SharedCache;
use crate::config::Settings;
use crate::engine::{EngineDeps, ResearchEngine};
use crate::guard::GuardRegistry;
use crate::metrics::RunMetrics;
use crate::model::{BatchResearchRequest, BatchResearchResponse};
use crate::source::SourceRegistry;
use crate::stream::StreamProtocol;

#[derive(Clone)]
pub struct AppState {
    pub sources: Arc<SourceRegistry>,
    pub guards: Arc<GuardRegistry>,
    pub cache: SharedCache,
    pub analyzer: SharedAnalyzer,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Guards for one run. A request-level parallelism override swaps in
    /// run-scoped pools; the process-wide breakers and rate windows stay.
    fn guards_for(&self, max_parallel: Option<usize>) -> Arc<GuardRegistry> {
        match max_parallel {
            Some(n) if n > 0 && n != self.settings.max_parallel_searches => {
                Arc::new(self.guards.with_pool_capacity(n))
            }
            _ => Arc::clone(&self.guards),
        }
    }

    fn build_engine(&self, req: &BatchResearchRequest) -> Arc<ResearchEngine> {
        let deps = EngineDeps {
            sources: Arc::clone(&self.sources),
            guards: self.guards_for(req.max_parallel_searches),
            cache: self.cache.clone(),
            analyzer: self.analyzer.clone(),
        };
        Arc::new(ResearchEngine::new(
            req.research_goal.clone(),
            req.search_depth,
            req.company_domains.clone(),
            req.strategies.clone(),
            req.confidence_threshold,
            deps,
            Arc::new(RunMetrics::start()),
            &self.settings,
        ))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/research/batch", post(research_batch))
        .route("/research/batch/stream", post(research_batch_stream))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn validate(req: &BatchResearchRequest) -> Result<(), Response> {
    let reject = |msg: &str| {
        Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": msg})),
        )
            .into_response())
    };
    if req.research_goal.trim().is_empty() {
        return reject("research_goal must not be empty");
    }
    if req.company_domains.is_empty() {
        return reject("company_domains must not be empty");
    }
    if req.strategies.is_empty() {
        return reject("strategies must not be empty");
    }
    Ok(())
}

async fn research_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchResearchRequest>,
) -> Response {
    if let Err(resp) = validate(&req) {
        return resp;
    }
    let engine = state.build_engine(&req);
    info!(
        research_id = engine.run_id(),
        companies = req.company_domains.len(),
        strategies = req.strategies.len(),
        "batch research started"
    );

    let research_id = engine.run_id().to_string();
    let strategies_count = req.strategies.len();
    let companies = req.company_domains.len();

    let handle = Arc::clone(&engine);
    let (results, total_searches) = engine.run().await;

    let response = BatchResearchResponse {
        research_id,
        total_companies: companies,
        search_strategies_generated: strategies_count,
        total_searches_executed: total_searches,
        processing_time_ms: handle.metrics().elapsed_ms(),
        results,
        search_performance: handle.metrics().performance(),
    };
    Json(response).into_response()
}

async fn research_batch_stream(
    State(state): State<AppState>,
    Json(req): Json<BatchResearchRequest>,
) -> Response {
    if let Err(resp) = validate(&req) {
        return resp;
    }
    let engine = state.build_engine(&req);
    info!(research_id = engine.run_id(), "streaming research started");

    let events = engine.run_stream();
    let stream = StreamProtocol::new(state.settings.heartbeat_interval())
        .stream(events)
        .map(|ev| Ok::<_, Infallible>(ev.to_sse()));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .expect("stream response")
}

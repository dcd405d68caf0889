//! GTM Research Engine — Binary Entrypoint
//! Boots the Axum HTTP server, wiring sources, guards, shared state, and
//! the Prometheus exporter.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gtm_research_engine::analyze::OpenAiAnalyzer;
use gtm_research_engine::api::{create_router, AppState};
use gtm_research_engine::cache::MemoryEvidenceCache;
use gtm_research_engine::config::Settings;
use gtm_research_engine::guard::GuardRegistry;
use gtm_research_engine::metrics::Metrics;
use gtm_research_engine::source::{
    self, JobsSearchSource, NewsSearchSource, SourceRegistry, WebSearchSource,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gtm_research_engine=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Register every source whose credentials are present; skip the rest with
/// a warning. The keyless jobs channel is always available.
fn build_sources(cache: &gtm_research_engine::cache::SharedCache) -> SourceRegistry {
    let mut sources = SourceRegistry::new();

    match WebSearchSource::from_env(cache.clone()) {
        Ok(src) => {
            sources.insert(
                source::web_search::CHANNEL.to_string(),
                Arc::new(src) as Arc<dyn source::Source>,
            );
        }
        Err(err) => warn!(error = ?err, "web_search channel disabled"),
    }
    match NewsSearchSource::from_env(cache.clone()) {
        Ok(src) => {
            sources.insert(
                source::news_search::CHANNEL.to_string(),
                Arc::new(src) as Arc<dyn source::Source>,
            );
        }
        Err(err) => warn!(error = ?err, "news_search channel disabled"),
    }
    // The jobs board endpoint needs no credentials.
    sources.insert(
        source::jobs_search::CHANNEL.to_string(),
        Arc::new(JobsSearchSource::new(cache.clone())) as Arc<dyn source::Source>,
    );

    if sources.len() == 1 {
        warn!("no API keys configured; only the jobs_search channel is active (set TAVILY_API_KEY and/or NEWS_API_KEY)");
    }
    sources
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load().context("loading engine settings")?;
    let cache = MemoryEvidenceCache::shared();
    let sources = Arc::new(build_sources(&cache));
    let guards = Arc::new(GuardRegistry::from_settings(
        &settings,
        sources.keys().map(String::as_str),
    ));
    let analyzer = Arc::new(OpenAiAnalyzer::from_env(settings.analyzer_model.clone())?);

    let metrics = Metrics::init();

    let state = AppState {
        sources,
        guards,
        cache,
        analyzer,
        settings: Arc::new(settings),
    };
    let router = create_router(state).merge(metrics.router());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "research engine listening");
    axum::serve(listener, router).await.context("http server")?;
    Ok(())
}

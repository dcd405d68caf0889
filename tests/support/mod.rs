// tests/support/mod.rs
//
// Shared fixtures for integration tests: scriptable sources and analyzers
// plus a helper that wires a full engine around them.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use anyhow::anyhow;

use gtm_research_engine::analyze::{Analysis, Analyzer, SharedAnalyzer};
use gtm_research_engine::cache::MemoryEvidenceCache;
use gtm_research_engine::engine::{EngineDeps, ResearchEngine};
use gtm_research_engine::guard::GuardRegistry;
use gtm_research_engine::metrics::RunMetrics;
use gtm_research_engine::model::{Evidence, QueryStrategy, SearchDepth};
use gtm_research_engine::source::{Source, SourceRegistry, SourceResult};
use gtm_research_engine::Settings;

/// What a `MockSource` does on each fetch.
#[derive(Clone)]
pub enum MockBehavior {
    /// Return one evidence item; url/title derive from the given tag.
    Evidence { tag: &'static str, score: f32 },
    /// Return a failed result.
    Fail,
    /// Sleep this long, then return one evidence item.
    Slow(Duration),
}

pub struct MockSource {
    channel: &'static str,
    behavior: MockBehavior,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new(channel: &'static str, behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            channel,
            behavior,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn evidence(&self, domain: &str, tag: &str, score: f32) -> Evidence {
        Evidence {
            url: format!("https://{tag}.example.com/{domain}"),
            title: format!("{tag} result for {domain}"),
            snippet: format!("{domain} mentioned by {tag}"),
            source_name: self.channel.to_string(),
            score,
        }
    }
}

#[async_trait]
impl Source for MockSource {
    async fn fetch(&self, domain: &str, query: &str, _depth: SearchDepth) -> SourceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match &self.behavior {
            MockBehavior::Evidence { tag, score } => SourceResult::success(
                self.channel,
                domain,
                query,
                vec![self.evidence(domain, tag, *score)],
            ),
            MockBehavior::Fail => {
                SourceResult::failed(self.channel, domain, query, "provider exploded")
            }
            MockBehavior::Slow(d) => {
                tokio::time::sleep(*d).await;
                SourceResult::success(
                    self.channel,
                    domain,
                    query,
                    vec![self.evidence(domain, "slow", 0.4)],
                )
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        self.channel
    }
}

pub struct MockAnalyzer {
    pub confidence: f64,
    pub calls: AtomicUsize,
}

impl MockAnalyzer {
    pub fn new(confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            confidence,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, _goal: &str, evidences: &[Evidence]) -> anyhow::Result<Analysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Analysis {
            labels: evidences
                .iter()
                .map(|e| e.source_name.clone())
                .collect::<std::collections::HashSet<_>>()
                .into_iter()
                .collect(),
            confidence_score: self.confidence,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Analyzer whose calls always error, for exercising degraded results.
pub struct FailingAnalyzer {
    pub calls: AtomicUsize,
}

impl FailingAnalyzer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for FailingAnalyzer {
    async fn analyze(&self, _goal: &str, _evidences: &[Evidence]) -> anyhow::Result<Analysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("model unavailable"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn test_settings() -> Settings {
    let mut s = Settings::default();
    s.source_timeout_seconds = 1;
    s
}

pub fn registry_of(sources: &[Arc<MockSource>]) -> Arc<SourceRegistry> {
    let mut map: SourceRegistry = HashMap::new();
    for src in sources {
        map.insert(src.channel.to_string(), src.clone() as Arc<dyn Source>);
    }
    Arc::new(map)
}

pub fn deps_for(
    sources: Arc<SourceRegistry>,
    guards: Arc<GuardRegistry>,
    analyzer: SharedAnalyzer,
) -> EngineDeps {
    EngineDeps {
        sources,
        guards,
        cache: MemoryEvidenceCache::shared(),
        analyzer,
    }
}

pub fn strategy(channel: &str, template: &str) -> QueryStrategy {
    QueryStrategy {
        channel: channel.to_string(),
        query_template: template.to_string(),
    }
}

pub fn engine(
    settings: &Settings,
    deps: EngineDeps,
    domains: &[&str],
    strategies: Vec<QueryStrategy>,
) -> Arc<ResearchEngine> {
    Arc::new(ResearchEngine::new(
        "companies using ml for fraud detection",
        SearchDepth::Standard,
        domains.iter().map(|d| d.to_string()).collect(),
        strategies,
        0.7,
        deps,
        Arc::new(RunMetrics::start()),
        settings,
    ))
}

//! # Data model
//! Wire-visible types shared by the engine, the aggregator, and the HTTP
//! layer. Everything here is plain data with serde derives; behavior lives
//! in the components that own it.

use serde::{Deserialize, Serialize};

/// One piece of collected evidence about a company.
///
/// Immutable value; ownership moves into whichever aggregation structure
/// currently holds it. Dedup identity is derived from `url` + `title`
/// (see `aggregate::dedup_key`), not from the whole struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Name of the channel that produced this item, e.g. "web_search".
    pub source_name: String,
    /// Provider-reported relevance in `[0, 1]`; 0.0 when the provider has none.
    #[serde(default)]
    pub score: f32,
}

/// A search strategy for a specific channel, produced by an external
/// planning step and consumed read-only by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStrategy {
    pub channel: String,
    pub query_template: String,
}

impl QueryStrategy {
    /// Substitute `{DOMAIN}` and `{COMPANY_NAME}` placeholders for one company.
    pub fn build_query(&self, company_domain: &str) -> String {
        let company_name = company_domain.split('.').next().unwrap_or(company_domain);
        self.query_template
            .replace("{DOMAIN}", company_domain)
            .replace("{COMPANY_NAME}", company_name)
    }
}

/// How deep a single fetch should go; providers map this onto their own
/// depth/page-size knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Quick,
    #[default]
    Standard,
    Comprehensive,
}

impl SearchDepth {
    /// Result-count budget per fetch for this depth.
    pub fn max_results(self) -> usize {
        match self {
            SearchDepth::Quick => 2,
            SearchDepth::Standard => 3,
            SearchDepth::Comprehensive => 5,
        }
    }
}

/// Extracted labels + the evidence backing them for one company.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Findings {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub signals_found: usize,
}

/// Final per-company outcome of one research run. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    pub domain: String,
    pub confidence_score: f64,
    /// Number of distinct channels that contributed evidence.
    pub evidence_sources: usize,
    pub findings: Findings,
}

impl ResearchResult {
    /// Zero-confidence result for a company that yielded no evidence.
    pub fn empty(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            confidence_score: 0.0,
            evidence_sources: 0,
            findings: Findings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPerformance {
    pub queries_per_second: f64,
    pub failed_requests: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchResearchRequest {
    pub research_goal: String,
    pub company_domains: Vec<String>,
    pub strategies: Vec<QueryStrategy>,
    #[serde(default)]
    pub search_depth: SearchDepth,
    #[serde(default)]
    pub max_parallel_searches: Option<usize>,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResearchResponse {
    pub research_id: String,
    pub total_companies: usize,
    pub search_strategies_generated: usize,
    pub total_searches_executed: usize,
    pub processing_time_ms: u64,
    pub results: Vec<ResearchResult>,
    pub search_performance: SearchPerformance,
}

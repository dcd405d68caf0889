//! # Research engine
//! Coordinates the full fan-out/fan-in lifecycle for one run: build the
//! entity × strategy task set, guard every task with its channel's
//! breaker/gate/pool, consume completions in whatever order they finish,
//! then analyze each entity's aggregated evidence. A run always completes
//! with one result per entity; individual task failures only degrade
//! coverage.

use metrics::counter;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::aggregate::EvidenceAggregator;
use crate::analyze::SharedAnalyzer;
use crate::cache::SharedCache;
use crate::config::Settings;
use crate::error::TaskFailure;
use crate::guard::GuardRegistry;
use crate::metrics::{ensure_metrics_described, record_tasks_planned, RunMetrics};
use crate::model::{QueryStrategy, ResearchResult, SearchDepth, SearchPerformance};
use crate::source::{SourceRegistry, SourceResult};

/// Injected collaborators shared across runs. Guards are keyed by channel
/// name and live for the process lifetime, so breaker state carries over
/// between runs as intended.
#[derive(Clone)]
pub struct EngineDeps {
    pub sources: Arc<SourceRegistry>,
    pub guards: Arc<GuardRegistry>,
    pub cache: SharedCache,
    pub analyzer: SharedAnalyzer,
}

/// Progress events produced by the streaming run. The stream protocol adds
/// sequence numbers and timestamps; payloads here stay purely factual.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    PipelineStart {
        message: String,
        domains: Vec<String>,
        total_strategies: usize,
    },
    EvidenceProgress {
        progress: u8,
        completed: usize,
        total: usize,
        domains_with_evidence: usize,
    },
    EvidenceComplete {
        message: String,
        total_evidence: usize,
        domains_with_evidence: usize,
    },
    AnalysisStart {
        message: String,
        domains_to_analyze: usize,
    },
    DomainAnalyzed {
        domain: String,
        confidence: f64,
        evidence_count: usize,
        labels: Vec<String>,
        progress: usize,
        total: usize,
    },
    PipelineComplete {
        message: String,
        summary: RunSummary,
        results: Vec<ResearchResult>,
        performance: SearchPerformance,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::PipelineStart { .. } => "pipeline_start",
            EngineEvent::EvidenceProgress { .. } => "evidence_progress",
            EngineEvent::EvidenceComplete { .. } => "evidence_complete",
            EngineEvent::AnalysisStart { .. } => "analysis_start",
            EngineEvent::DomainAnalyzed { .. } => "domain_analyzed",
            EngineEvent::PipelineComplete { .. } => "pipeline_complete",
        }
    }

    /// Whether this event carries the run's final summary.
    pub fn is_pipeline_complete(&self) -> bool {
        matches!(self, EngineEvent::PipelineComplete { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_domains: usize,
    pub domains_analyzed: usize,
    pub high_confidence_matches: usize,
    pub avg_confidence: f64,
    pub total_evidence: usize,
    pub processing_time_ms: u64,
}

/// The consumer side of the event channel went away.
struct Disconnected;

pub struct ResearchEngine {
    run_id: String,
    goal: String,
    depth: SearchDepth,
    domains: Vec<String>,
    strategies: Vec<QueryStrategy>,
    confidence_threshold: f64,
    source_timeout: Duration,
    deps: EngineDeps,
    metrics: Arc<RunMetrics>,
}

impl ResearchEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        goal: impl Into<String>,
        depth: SearchDepth,
        domains: Vec<String>,
        strategies: Vec<QueryStrategy>,
        confidence_threshold: f64,
        deps: EngineDeps,
        metrics: Arc<RunMetrics>,
        settings: &Settings,
    ) -> Self {
        // Duplicate entities would skew the result-per-entity contract.
        let mut seen = HashSet::new();
        let domains = domains
            .into_iter()
            .filter(|d| seen.insert(d.clone()))
            .collect();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            goal: goal.into(),
            depth,
            domains,
            strategies,
            confidence_threshold,
            source_timeout: settings.source_timeout(),
            deps,
            metrics,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Execute one task: resolve the channel's source and guards, then
    /// fetch with a timeout. Every failure mode collapses into a failed
    /// `SourceResult`; nothing escapes the task boundary.
    async fn execute_one(&self, domain: String, strategy: QueryStrategy) -> (String, SourceResult) {
        let query = strategy.build_query(&domain);

        let Some(source) = self.deps.sources.get(&strategy.channel).cloned() else {
            warn!(
                channel = %strategy.channel,
                domain = %domain,
                "strategy references unregistered channel"
            );
            let failed = SourceResult::failed(
                strategy.channel.as_str(),
                domain.as_str(),
                query.as_str(),
                TaskFailure::UnknownChannel.to_string(),
            );
            return (domain, failed);
        };

        let guards = self.deps.guards.for_channel(&strategy.channel);

        // Breaker check comes before any gate/pool acquisition: an open
        // circuit must not cost pool capacity.
        if !guards.breaker.allow_request() {
            counter!("engine_circuit_open_total").increment(1);
            let failed = SourceResult::failed(
                strategy.channel.as_str(),
                domain.as_str(),
                query.as_str(),
                TaskFailure::CircuitOpen.to_string(),
            );
            return (domain, failed);
        }

        guards.gate.admit().await;
        let permit = guards.pool.acquire().await;
        let outcome =
            tokio::time::timeout(self.source_timeout, source.fetch(&domain, &query, self.depth))
                .await;
        drop(permit);

        match outcome {
            Ok(result) => {
                if result.ok {
                    self.metrics.record_query();
                    guards.breaker.record_success();
                } else {
                    self.metrics.record_failure();
                    guards.breaker.record_failure();
                    warn!(
                        channel = %strategy.channel,
                        domain = %domain,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "source fetch failed"
                    );
                }
                (domain, result)
            }
            Err(_) => {
                self.metrics.record_failure();
                guards.breaker.record_failure();
                let failure = TaskFailure::Timeout {
                    seconds: self.source_timeout.as_secs(),
                };
                warn!(channel = %strategy.channel, domain = %domain, "{failure}");
                let failed = SourceResult::failed(
                    strategy.channel.as_str(),
                    domain.as_str(),
                    query.as_str(),
                    failure.to_string(),
                );
                (domain, failed)
            }
        }
    }

    /// Spawn the full entity × strategy task set. Tasks run concurrently
    /// with no ordering; completions come back through the JoinSet.
    fn spawn_fetch_tasks(self: &Arc<Self>) -> (JoinSet<(String, SourceResult)>, usize) {
        let mut set = JoinSet::new();
        for domain in &self.domains {
            for strategy in &self.strategies {
                let engine = Arc::clone(self);
                let domain = domain.clone();
                let strategy = strategy.clone();
                set.spawn(async move { engine.execute_one(domain, strategy).await });
            }
        }
        let total = set.len();
        (set, total)
    }

    /// Phase-2 step for one entity: clear its cross-run cache entries,
    /// analyze the aggregated evidence, snapshot the result. Analysis
    /// failure degrades to whatever the snapshot holds (zero confidence).
    async fn analyze_domain(&self, aggregator: &EvidenceAggregator, domain: &str) -> ResearchResult {
        if let Err(err) = self.deps.cache.clear(domain).await {
            warn!(error = ?err, domain, "evidence cache clear failed");
        }
        let evidences = aggregator.evidence_for(domain);
        match self.deps.analyzer.analyze(&self.goal, &evidences).await {
            Ok(analysis) => aggregator.record_analysis(domain, &analysis),
            Err(err) => {
                warn!(error = ?err, domain, "analysis failed, result degrades to zero confidence");
            }
        }
        aggregator.build_result(domain)
    }

    /// Batch mode: two-phase pipeline (collect all evidence, then analyze
    /// per entity). Returns one result per entity plus the number of fetch
    /// tasks planned.
    pub async fn run(self: Arc<Self>) -> (Vec<ResearchResult>, usize) {
        ensure_metrics_described();
        let aggregator = Arc::new(EvidenceAggregator::new());

        let (mut fetches, total_planned) = self.spawn_fetch_tasks();
        record_tasks_planned(total_planned);

        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((domain, result)) => {
                    if result.ok {
                        for evidence in result.evidences {
                            aggregator.add_evidence(&domain, evidence);
                        }
                    }
                }
                Err(err) => {
                    // A panicked task must not take the run down with it.
                    error!(error = ?err, "fetch task aborted");
                    self.metrics.record_failure();
                }
            }
        }

        // Disconnects cannot happen without a progress sender; if that ever
        // changes, the snapshot fallback still yields one result per entity.
        let results = self
            .analyze_all(&aggregator, None)
            .await
            .unwrap_or_else(|Disconnected| {
                self.domains
                    .iter()
                    .map(|domain| aggregator.build_result(domain))
                    .collect()
            });
        (results, total_planned)
    }

    /// Streaming mode: the same work as `run`, pushing typed progress
    /// events into a channel as it goes. A failed send means the consumer
    /// disconnected; the run stops promptly instead of finishing orphaned
    /// work.
    pub fn run_stream(self: Arc<Self>) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            if self.drive_stream(tx).await.is_err() {
                debug!("stream consumer disconnected, run aborted");
            }
        });
        rx
    }

    async fn drive_stream(
        self: Arc<Self>,
        tx: mpsc::Sender<EngineEvent>,
    ) -> Result<(), Disconnected> {
        ensure_metrics_described();
        let aggregator = Arc::new(EvidenceAggregator::new());

        send(
            &tx,
            EngineEvent::PipelineStart {
                message: "Starting evidence collection".to_string(),
                domains: self.domains.clone(),
                total_strategies: self.strategies.len(),
            },
        )
        .await?;

        let (mut fetches, total_planned) = self.spawn_fetch_tasks();
        record_tasks_planned(total_planned);

        let mut completed = 0usize;
        let mut milestones: Vec<u8> = vec![25, 50, 75, 100];
        while let Some(joined) = fetches.join_next().await {
            completed += 1;
            match joined {
                Ok((domain, result)) => {
                    if result.ok {
                        for evidence in result.evidences {
                            aggregator.add_evidence(&domain, evidence);
                        }
                    }
                }
                Err(err) => {
                    error!(error = ?err, "fetch task aborted");
                    self.metrics.record_failure();
                }
            }

            let percent = if total_planned == 0 {
                100
            } else {
                ((completed * 100) / total_planned) as u8
            };
            while milestones.first().is_some_and(|m| percent >= *m) {
                let milestone = milestones.remove(0);
                send(
                    &tx,
                    EngineEvent::EvidenceProgress {
                        progress: milestone,
                        completed,
                        total: total_planned,
                        domains_with_evidence: aggregator.domains_with_evidence().len(),
                    },
                )
                .await?;
            }
        }

        send(
            &tx,
            EngineEvent::EvidenceComplete {
                message: "Evidence collection finished".to_string(),
                total_evidence: aggregator.total_evidence(),
                domains_with_evidence: aggregator.domains_with_evidence().len(),
            },
        )
        .await?;

        send(
            &tx,
            EngineEvent::AnalysisStart {
                message: "Starting domain analysis".to_string(),
                domains_to_analyze: aggregator.domains_with_evidence().len(),
            },
        )
        .await?;

        let results = self.analyze_all(&aggregator, Some(&tx)).await?;

        let summary = self.summarize(&results);
        send(
            &tx,
            EngineEvent::PipelineComplete {
                message: "Research pipeline completed".to_string(),
                summary,
                results,
                performance: self.metrics.performance(),
            },
        )
        .await?;
        Ok(())
    }

    /// Phase 2: analyze every entity that accumulated evidence (in
    /// completion order), then backfill zero-confidence results for the
    /// rest. When `progress` is given, emits one `DomainAnalyzed` per
    /// completed analysis; send failures abort remaining work.
    async fn analyze_all(
        self: &Arc<Self>,
        aggregator: &Arc<EvidenceAggregator>,
        progress: Option<&mpsc::Sender<EngineEvent>>,
    ) -> Result<Vec<ResearchResult>, Disconnected> {
        let to_analyze = aggregator.domains_with_evidence();
        let total = to_analyze.len();

        let mut analyses = JoinSet::new();
        for domain in to_analyze {
            let engine = Arc::clone(self);
            let agg = Arc::clone(aggregator);
            analyses.spawn(async move {
                let result = engine.analyze_domain(&agg, &domain).await;
                (domain, result)
            });
        }

        let mut results = Vec::with_capacity(self.domains.len());
        let mut done_domains = HashSet::new();
        let mut analyzed = 0usize;
        while let Some(joined) = analyses.join_next().await {
            match joined {
                Ok((domain, result)) => {
                    analyzed += 1;
                    if let Some(tx) = progress {
                        let sent = send(
                            tx,
                            EngineEvent::DomainAnalyzed {
                                domain: domain.clone(),
                                confidence: result.confidence_score,
                                evidence_count: result.findings.evidence.len(),
                                labels: result.findings.labels.clone(),
                                progress: analyzed,
                                total,
                            },
                        )
                        .await;
                        if sent.is_err() {
                            analyses.abort_all();
                            return Err(Disconnected);
                        }
                    }
                    done_domains.insert(domain);
                    results.push(result);
                }
                Err(err) => {
                    error!(error = ?err, "analysis task aborted");
                }
            }
        }

        // Entities with zero evidence (or a crashed analysis) still get a
        // result; never omitted from final output.
        for domain in &self.domains {
            if !done_domains.contains(domain) {
                results.push(aggregator.build_result(domain));
            }
        }
        Ok(results)
    }

    fn summarize(&self, results: &[ResearchResult]) -> RunSummary {
        let high_confidence_matches = results
            .iter()
            .filter(|r| r.confidence_score >= self.confidence_threshold)
            .count();
        let avg = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.confidence_score).sum::<f64>() / results.len() as f64
        };
        RunSummary {
            total_domains: self.domains.len(),
            domains_analyzed: results.len(),
            high_confidence_matches,
            avg_confidence: (avg * 100.0).round() / 100.0,
            total_evidence: results.iter().map(|r| r.findings.evidence.len()).sum(),
            processing_time_ms: self.metrics.elapsed_ms(),
        }
    }
}

async fn send(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) -> Result<(), Disconnected> {
    tx.send(event).await.map_err(|_| Disconnected)
}

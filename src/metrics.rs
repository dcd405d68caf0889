//! # Metrics
//! Two layers: `RunMetrics` (run-scoped counters read by the caller at
//! completion) and the process-wide Prometheus exporter with the engine's
//! counter series.

use axum::{routing::get, Router};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::model::SearchPerformance;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("engine_tasks_total", "Fetch tasks planned across all runs.");
        describe_counter!(
            "engine_task_failures_total",
            "Fetch tasks that ended in a failed SourceResult."
        );
        describe_counter!(
            "engine_circuit_open_total",
            "Tasks short-circuited by an open breaker."
        );
        describe_counter!(
            "engine_evidence_kept_total",
            "Evidence items accepted by the aggregator."
        );
        describe_counter!(
            "engine_evidence_dedup_total",
            "Evidence items collapsed into an existing dedup key."
        );
    });
}

/// Record that a run planned `n` fetch tasks.
pub fn record_tasks_planned(n: usize) {
    counter!("engine_tasks_total").increment(n as u64);
}

/// Run-scoped success/failure accounting, safe under concurrent increments.
#[derive(Debug)]
pub struct RunMetrics {
    started: Instant,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl RunMetrics {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn record_query(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        counter!("engine_task_failures_total").increment(1);
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Successful-task throughput plus the failure count, rounded the way
    /// the API reports it.
    pub fn performance(&self) -> SearchPerformance {
        let elapsed = self.started.elapsed().as_secs_f64().max(0.0001);
        let qps = self.successes() as f64 / elapsed;
        SearchPerformance {
            queries_per_second: (qps * 100.0).round() / 100.0,
            failed_requests: self.failures(),
        }
    }
}

/// Prometheus recorder + `/metrics` router.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_metrics_described();
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = RunMetrics::start();
        m.record_query();
        m.record_query();
        m.record_failure();
        assert_eq!(m.successes(), 2);
        assert_eq!(m.failures(), 1);
        let perf = m.performance();
        assert_eq!(perf.failed_requests, 1);
        assert!(perf.queries_per_second > 0.0);
    }
}

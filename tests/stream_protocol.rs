// tests/stream_protocol.rs
//
// Wire-protocol guarantees: connected-first framing, monotonic sequence
// numbers, exactly one terminal event, heartbeat injection on idle gaps,
// and teardown when the consumer walks away.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use gtm_research_engine::engine::{EngineEvent, RunSummary};
use gtm_research_engine::guard::GuardRegistry;
use gtm_research_engine::model::SearchPerformance;
use gtm_research_engine::stream::{StreamEvent, StreamProtocol};
use support::{deps_for, engine, registry_of, strategy, test_settings, MockAnalyzer, MockBehavior, MockSource};

async fn collect(stream: tokio_stream::wrappers::ReceiverStream<StreamEvent>) -> Vec<StreamEvent> {
    stream.collect().await
}

fn pipeline_complete_event() -> EngineEvent {
    EngineEvent::PipelineComplete {
        message: "Research pipeline completed".to_string(),
        summary: RunSummary {
            total_domains: 1,
            domains_analyzed: 1,
            high_confidence_matches: 1,
            avg_confidence: 0.9,
            total_evidence: 2,
            processing_time_ms: 12,
        },
        results: Vec::new(),
        performance: SearchPerformance {
            queries_per_second: 4.0,
            failed_requests: 0,
        },
    }
}

#[tokio::test]
async fn connected_comes_first_and_sequences_are_monotonic() {
    let (tx, rx) = mpsc::channel(8);
    let stream = StreamProtocol::new(Duration::from_secs(30)).stream(rx);

    tx.send(EngineEvent::AnalysisStart {
        message: "Starting domain analysis".to_string(),
        domains_to_analyze: 1,
    })
    .await
    .unwrap();
    tx.send(pipeline_complete_event()).await.unwrap();
    drop(tx);

    let events = collect(stream).await;
    assert_eq!(events[0].event_type, "connected");
    assert_eq!(events[0].sequence, 0);
    for pair in events.windows(2) {
        assert_eq!(pair[1].sequence, pair[0].sequence + 1);
    }
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert_eq!(events.last().unwrap().event_type, "completed");
    assert_eq!(
        events.last().unwrap().data["total_events"],
        serde_json::json!(events.len() as u64 - 1)
    );
}

#[tokio::test]
async fn channel_closing_without_completion_yields_terminal_error() {
    let (tx, rx) = mpsc::channel::<EngineEvent>(8);
    let stream = StreamProtocol::new(Duration::from_secs(30)).stream(rx);
    drop(tx);

    let events = collect(stream).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "connected");
    assert_eq!(events[1].event_type, "error");
    assert_eq!(events[1].data["recoverable"], serde_json::json!(false));
}

#[tokio::test(start_paused = true)]
async fn heartbeats_fill_idle_gaps() {
    let (tx, rx) = mpsc::channel::<EngineEvent>(8);
    let stream = StreamProtocol::new(Duration::from_millis(50)).stream(rx);

    let handle = tokio::spawn(collect(stream));
    tokio::time::sleep(Duration::from_millis(170)).await;
    tx.send(pipeline_complete_event()).await.unwrap();
    drop(tx);

    let events = handle.await.unwrap();
    let heartbeats = events
        .iter()
        .filter(|e| e.event_type == "heartbeat")
        .count();
    assert!(heartbeats >= 2, "expected heartbeats during the idle gap, saw {heartbeats}");
    assert_eq!(events.last().unwrap().event_type, "completed");
}

#[tokio::test]
async fn sse_rendering_marks_only_connected_with_retry() {
    let (tx, rx) = mpsc::channel::<EngineEvent>(8);
    let stream = StreamProtocol::new(Duration::from_secs(30)).stream(rx);
    drop(tx);

    let events = collect(stream).await;
    let connected = events[0].to_sse();
    assert!(connected.starts_with("id: 0\nretry: 1000\nevent: connected\ndata: "));
    assert!(connected.ends_with("\n\n"));
    let error = events[1].to_sse();
    assert!(error.starts_with("id: 1\nevent: error\n"));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_consumer_aborts_the_run() {
    let settings = test_settings();
    let web = MockSource::new("web_search", MockBehavior::Slow(Duration::from_millis(50)));
    let sources = registry_of(&[web.clone()]);
    let guards = Arc::new(GuardRegistry::from_settings(&settings, ["web_search"]));
    let analyzer = MockAnalyzer::new(0.9);

    let eng = engine(
        &settings,
        deps_for(sources, guards, analyzer.clone()),
        &["acme.io", "globex.com"],
        vec![strategy("web_search", "{DOMAIN}")],
    );

    let events = eng.run_stream();
    let stream = StreamProtocol::new(Duration::from_secs(30)).stream(events);
    drop(stream);

    // Let the fetch phase finish; the first progress send after the pump
    // noticed the drop aborts the run before analysis begins.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(analyzer.calls(), 0, "analysis never starts for a gone consumer");
}

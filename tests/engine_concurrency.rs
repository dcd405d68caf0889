// tests/engine_concurrency.rs
//
// The per-channel pool must cap how many fetches run at once, and the
// rate gate must bound admissions inside its window.

mod support;

use std::sync::Arc;
use std::time::Duration;

use gtm_research_engine::guard::GuardRegistry;
use support::{deps_for, engine, registry_of, strategy, test_settings, MockAnalyzer, MockBehavior, MockSource};

#[tokio::test(start_paused = true)]
async fn pool_caps_in_flight_fetches() {
    let mut settings = test_settings();
    settings.max_parallel_searches = 2;
    settings.source_timeout_seconds = 60;

    let web = MockSource::new("web_search", MockBehavior::Slow(Duration::from_millis(100)));
    let sources = registry_of(&[web.clone()]);
    let guards = Arc::new(GuardRegistry::from_settings(&settings, ["web_search"]));
    let analyzer = MockAnalyzer::new(0.5);

    let domains = ["a.io", "b.io", "c.io", "d.io", "e.io"];
    let eng = engine(
        &settings,
        deps_for(sources, guards, analyzer),
        &domains,
        vec![
            strategy("web_search", "{DOMAIN} one"),
            strategy("web_search", "{DOMAIN} two"),
        ],
    );

    let (results, total) = eng.run().await;
    assert_eq!(total, 10);
    assert_eq!(web.calls(), 10, "every task eventually ran");
    assert!(
        web.peak() <= 2,
        "peak in-flight was {}, pool allows 2",
        web.peak()
    );
    assert_eq!(results.len(), 5);
}

#[tokio::test]
async fn rate_gate_defers_tasks_beyond_the_window_budget() {
    let mut settings = test_settings();
    settings.channel_rpm.insert("web_search".to_string(), 2);
    settings.source_timeout_seconds = 60;

    let web = MockSource::new("web_search", MockBehavior::Evidence { tag: "web", score: 0.5 });
    let sources = registry_of(&[web.clone()]);
    let guards = Arc::new(GuardRegistry::from_settings(&settings, ["web_search"]));
    let channel_guards = guards.for_channel("web_search");

    // Two admissions fit the window; the third is deferred.
    assert!(channel_guards.gate.try_admit());
    assert!(channel_guards.gate.try_admit());
    assert!(!channel_guards.gate.try_admit());

    // A run needing only the remaining budget is unaffected.
    let analyzer = MockAnalyzer::new(0.5);
    let eng = engine(
        &settings,
        deps_for(sources, Arc::new(GuardRegistry::from_settings(&settings, ["web_search"])), analyzer),
        &["a.io", "b.io"],
        vec![strategy("web_search", "{DOMAIN}")],
    );
    let (results, _) = eng.run().await;
    assert_eq!(web.calls(), 2);
    assert_eq!(results.len(), 2);
}

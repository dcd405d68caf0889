//! # Evidence cache
//! Optional cross-run dedup capability used opportunistically by sources:
//! already-seen evidence is skipped before it ever reaches the aggregator.
//! Cache failures must never fail a fetch, so callers log and continue.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::model::Evidence;

#[async_trait]
pub trait EvidenceCache: Send + Sync {
    async fn contains(&self, domain: &str, evidence: &Evidence) -> Result<bool>;
    async fn record(&self, domain: &str, evidence: &Evidence) -> Result<()>;
    async fn clear(&self, domain: &str) -> Result<()>;
}

pub type SharedCache = Arc<dyn EvidenceCache>;

#[derive(Debug, Default)]
struct DomainSets {
    urls: HashSet<String>,
    titles: HashSet<String>,
    snippets: HashSet<String>,
}

/// In-process cache keyed by company domain. Matches on any of url, title,
/// or snippet, mirroring the external key-value layout this seam replaces.
#[derive(Debug, Default)]
pub struct MemoryEvidenceCache {
    inner: Mutex<HashMap<String, DomainSets>>,
}

impl MemoryEvidenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCache {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl EvidenceCache for MemoryEvidenceCache {
    async fn contains(&self, domain: &str, evidence: &Evidence) -> Result<bool> {
        let inner = self.inner.lock().expect("evidence cache mutex poisoned");
        Ok(inner.get(domain).is_some_and(|sets| {
            sets.urls.contains(&evidence.url)
                || sets.titles.contains(&evidence.title)
                || sets.snippets.contains(&evidence.snippet)
        }))
    }

    async fn record(&self, domain: &str, evidence: &Evidence) -> Result<()> {
        let mut inner = self.inner.lock().expect("evidence cache mutex poisoned");
        let sets = inner.entry(domain.to_string()).or_default();
        sets.urls.insert(evidence.url.clone());
        sets.titles.insert(evidence.title.clone());
        sets.snippets.insert(evidence.snippet.clone());
        Ok(())
    }

    async fn clear(&self, domain: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("evidence cache mutex poisoned");
        inner.remove(domain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(url: &str, title: &str) -> Evidence {
        Evidence {
            url: url.to_string(),
            title: title.to_string(),
            snippet: format!("snippet for {title}"),
            source_name: "web_search".to_string(),
            score: 0.5,
        }
    }

    #[tokio::test]
    async fn record_then_contains_then_clear() {
        let cache = MemoryEvidenceCache::new();
        let e = ev("https://a.test/x", "Title");
        assert!(!cache.contains("acme.io", &e).await.unwrap());
        cache.record("acme.io", &e).await.unwrap();
        assert!(cache.contains("acme.io", &e).await.unwrap());
        // other domains are isolated
        assert!(!cache.contains("other.io", &e).await.unwrap());
        cache.clear("acme.io").await.unwrap();
        assert!(!cache.contains("acme.io", &e).await.unwrap());
    }

    #[tokio::test]
    async fn title_match_alone_counts_as_seen() {
        let cache = MemoryEvidenceCache::new();
        cache.record("acme.io", &ev("https://a.test/1", "Same")).await.unwrap();
        let other_url = ev("https://a.test/2", "Same");
        assert!(cache.contains("acme.io", &other_url).await.unwrap());
    }
}

//! Web search channel backed by the Tavily search API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::cache::SharedCache;
use crate::model::{Evidence, SearchDepth};
use crate::source::{Source, SourceResult};

pub const CHANNEL: &str = "web_search";

const ENDPOINT: &str = "https://api.tavily.com/search";
const TITLE_CAP: usize = 200;
const SNIPPET_CAP: usize = 500;

pub struct WebSearchSource {
    http: reqwest::Client,
    api_key: String,
    cache: SharedCache,
}

impl WebSearchSource {
    /// Requires `TAVILY_API_KEY`; a missing key is a startup error, not a
    /// per-task one.
    pub fn from_env(cache: SharedCache) -> Result<Self> {
        let api_key =
            std::env::var("TAVILY_API_KEY").context("TAVILY_API_KEY environment variable is required")?;
        let http = reqwest::Client::builder()
            .user_agent("gtm-research-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            api_key,
            cache,
        })
    }

    fn tavily_depth(depth: SearchDepth) -> &'static str {
        match depth {
            SearchDepth::Quick => "basic",
            SearchDepth::Standard | SearchDepth::Comprehensive => "advanced",
        }
    }

    async fn fetch_impl(&self, domain: &str, query: &str, depth: SearchDepth) -> Result<Vec<Evidence>> {
        #[derive(Serialize)]
        struct Req<'a> {
            api_key: &'a str,
            query: &'a str,
            search_depth: &'a str,
            max_results: usize,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            results: Vec<Hit>,
        }
        #[derive(Deserialize)]
        struct Hit {
            #[serde(default)]
            url: String,
            #[serde(default)]
            title: String,
            #[serde(default)]
            content: String,
            #[serde(default)]
            score: f32,
        }

        let req = Req {
            api_key: &self.api_key,
            query,
            search_depth: Self::tavily_depth(depth),
            max_results: depth.max_results(),
        };
        let resp = self
            .http
            .post(ENDPOINT)
            .json(&req)
            .send()
            .await
            .context("tavily request failed")?
            .error_for_status()
            .context("tavily returned an error status")?;
        let body: Resp = resp.json().await.context("parsing tavily response")?;

        let mut evidences = Vec::with_capacity(body.results.len());
        for hit in body.results {
            if hit.url.is_empty() {
                continue;
            }
            let evidence = Evidence {
                url: hit.url,
                title: truncate(&hit.title, TITLE_CAP),
                snippet: truncate(&hit.content, SNIPPET_CAP),
                source_name: CHANNEL.to_string(),
                score: hit.score,
            };
            if self.already_seen(domain, &evidence).await {
                continue;
            }
            evidences.push(evidence);
        }
        Ok(evidences)
    }

    /// Cross-run dedup is best-effort: a broken cache never fails a fetch.
    async fn already_seen(&self, domain: &str, evidence: &Evidence) -> bool {
        match self.cache.contains(domain, evidence).await {
            Ok(true) => true,
            Ok(false) => {
                if let Err(err) = self.cache.record(domain, evidence).await {
                    warn!(error = ?err, domain, "evidence cache record failed");
                }
                false
            }
            Err(err) => {
                warn!(error = ?err, domain, "evidence cache lookup failed");
                false
            }
        }
    }
}

fn truncate(s: &str, cap: usize) -> String {
    s.chars().take(cap).collect()
}

#[async_trait]
impl Source for WebSearchSource {
    async fn fetch(&self, domain: &str, query: &str, depth: SearchDepth) -> SourceResult {
        match self.fetch_impl(domain, query, depth).await {
            Ok(evidences) => SourceResult::success(CHANNEL, domain, query, evidences),
            Err(err) => SourceResult::failed(
                CHANNEL,
                domain,
                query,
                format!("web search failed: {err:#}"),
            ),
        }
    }

    fn name(&self) -> &'static str {
        CHANNEL
    }
}

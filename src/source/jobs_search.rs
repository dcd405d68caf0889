//! Jobs channel backed by the public Greenhouse boards API. Open roles are
//! strong evidence of what a company actually runs, so postings are ranked
//! against the query and only the relevant ones surface.

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

use crate::cache::SharedCache;
use crate::model::{Evidence, SearchDepth};
use crate::source::{Source, SourceResult};

pub const CHANNEL: &str = "jobs_search";

/// Minimum fraction of query terms a posting must mention to count.
const MATCH_THRESHOLD: f32 = 0.2;

pub struct JobsSearchSource {
    http: reqwest::Client,
    cache: SharedCache,
}

impl JobsSearchSource {
    /// No credentials: the Greenhouse boards endpoint is public.
    pub fn new(cache: SharedCache) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("gtm-research-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { http, cache }
    }

    async fn fetch_impl(&self, domain: &str, query: &str, depth: SearchDepth) -> Result<Vec<Evidence>> {
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            jobs: Vec<Job>,
        }
        #[derive(Deserialize)]
        struct Job {
            title: Option<String>,
            content: Option<String>,
            absolute_url: Option<String>,
            location: Option<Location>,
            updated_at: Option<String>,
        }
        #[derive(Deserialize)]
        struct Location {
            name: Option<String>,
        }

        // Greenhouse boards are keyed by company slug, not domain.
        let company_name = domain.split('.').next().unwrap_or(domain);
        let url = format!("https://boards-api.greenhouse.io/v1/boards/{company_name}/jobs");

        let resp = self
            .http
            .get(&url)
            .query(&[("content", "true")])
            .send()
            .await
            .context("greenhouse request failed")?
            .error_for_status()
            .context("greenhouse returned an error status")?;
        let body: Resp = resp.json().await.context("parsing greenhouse response")?;

        let mut scored: Vec<(f32, Evidence)> = Vec::new();
        for job in body.jobs {
            let Some(job_url) = job.absolute_url.filter(|u| !u.is_empty()) else {
                continue;
            };
            let title = job.title.unwrap_or_default();
            let content = strip_tags(&job.content.unwrap_or_default());
            // Title counts double, the way recruiters front-load the signal.
            let score = relevance(query, &format!("{title} {title} {content}"));
            if score < MATCH_THRESHOLD {
                continue;
            }

            let location = job
                .location
                .and_then(|l| l.name)
                .unwrap_or_else(|| "unknown location".to_string());
            let mut snippet = format!("Job opening: {title} at {location}");
            if let Some(updated) = job.updated_at.filter(|u| !u.is_empty()) {
                snippet.push_str(&format!(" (updated {updated})"));
            }

            scored.push((
                score,
                Evidence {
                    url: job_url,
                    title,
                    snippet,
                    source_name: CHANNEL.to_string(),
                    score,
                },
            ));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut evidences = Vec::new();
        for (_, evidence) in scored.into_iter().take(depth.max_results()) {
            if self.already_seen(domain, &evidence).await {
                continue;
            }
            evidences.push(evidence);
        }
        Ok(evidences)
    }

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

/// Fraction of distinct query terms (3+ chars) that appear in the text.
fn relevance(query: &str, text: &str) -> f32 {
    let text = text.to_lowercase();
    let query = query.to_lowercase();
    let terms: HashSet<&str> = query
        .split_whitespace()
        .filter(|t| t.len() >= 3)
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let hits = terms.iter().filter(|&&t| text.contains(t)).count();
    hits as f32 / terms.len() as f32
}

fn strip_tags(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    re_tags.replace_all(&decoded, " ").into_owned()
}

#[async_trait]
impl Source for JobsSearchSource {
    async fn fetch(&self, domain: &str, query: &str, depth: SearchDepth) -> SourceResult {
        match self.fetch_impl(domain, query, depth).await {
            Ok(evidences) => SourceResult::success(CHANNEL, domain, query, evidences),
            Err(err) => SourceResult::failed(
                CHANNEL,
                domain,
                query,
                format!("jobs search failed: {err:#}"),
            ),
        }
    }

    fn name(&self) -> &'static str {
        CHANNEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_counts_matching_terms() {
        let text = "Senior Machine Learning Engineer building fraud detection models";
        assert!((relevance("machine learning fraud", text) - 1.0).abs() < f32::EPSILON);
        assert!((relevance("machine learning kubernetes", text) - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(relevance("golang", text), 0.0);
    }

    #[test]
    fn relevance_ignores_short_tokens_and_case() {
        let text = "ML Platform Engineer";
        // "ml" and "on" are below the length floor; "platform" matches.
        assert!((relevance("ml on PLATFORM", text) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn strip_tags_removes_markup_and_entities() {
        let stripped = strip_tags("&lt;p&gt;We use &lt;b&gt;TensorFlow&lt;/b&gt;&lt;/p&gt;");
        assert!(!stripped.contains('<'));
        assert!(stripped.contains("TensorFlow"));
    }
}

//! News channel backed by the NewsAPI `everything` endpoint: press
//! releases, announcements, and coverage mentioning the company.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::cache::SharedCache;
use crate::model::{Evidence, SearchDepth};
use crate::source::{Source, SourceResult};

pub const CHANNEL: &str = "news_search";

const ENDPOINT: &str = "https://newsapi.org/v2/everything";

pub struct NewsSearchSource {
    http: reqwest::Client,
    api_key: String,
    cache: SharedCache,
}

impl NewsSearchSource {
    /// Requires `NEWS_API_KEY`; a missing key is a startup error.
    pub fn from_env(cache: SharedCache) -> Result<Self> {
        let api_key =
            std::env::var("NEWS_API_KEY").context("NEWS_API_KEY environment variable is required")?;
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

    async fn fetch_impl(&self, domain: &str, query: &str, depth: SearchDepth) -> Result<Vec<Evidence>> {
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            articles: Vec<Article>,
        }
        #[derive(Deserialize)]
        struct Article {
            url: Option<String>,
            title: Option<String>,
            description: Option<String>,
        }

        // Anchor the query to the company name so generic strategy terms do
        // not drown the results in unrelated coverage.
        let company_name = domain.split('.').next().unwrap_or(domain);
        let search_query = format!("\"{company_name}\" AND ({query})");

        let resp = self
            .http
            .get(ENDPOINT)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", search_query.as_str()),
                ("sortBy", "relevancy"),
                ("language", "en"),
                ("pageSize", &depth.max_results().to_string()),
            ])
            .send()
            .await
            .context("newsapi request failed")?
            .error_for_status()
            .context("newsapi returned an error status")?;
        let body: Resp = resp.json().await.context("parsing newsapi response")?;

        let mut evidences = Vec::with_capacity(body.articles.len());
        for article in body.articles {
            let Some(url) = article.url.filter(|u| !u.is_empty()) else {
                continue;
            };
            let evidence = Evidence {
                url,
                title: article.title.unwrap_or_default(),
                snippet: article.description.unwrap_or_default(),
                source_name: CHANNEL.to_string(),
                score: 0.0,
            };
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

#[async_trait]
impl Source for NewsSearchSource {
    async fn fetch(&self, domain: &str, query: &str, depth: SearchDepth) -> SourceResult {
        match self.fetch_impl(domain, query, depth).await {
            Ok(evidences) => SourceResult::success(CHANNEL, domain, query, evidences),
            Err(err) => SourceResult::failed(
                CHANNEL,
                domain,
                query,
                format!("news search failed: {err:#}"),
            ),
        }
    }

    fn name(&self) -> &'static str {
        CHANNEL
    }
}

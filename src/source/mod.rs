//! # Sources
//! Pluggable evidence providers, one per channel. A well-behaved source
//! never raises past its boundary: failures come back as a structured
//! `SourceResult` with `ok == false`.

pub mod jobs_search;
pub mod news_search;
pub mod web_search;

pub use jobs_search::JobsSearchSource;
pub use news_search::NewsSearchSource;
pub use web_search::WebSearchSource;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Evidence, SearchDepth};

/// Outcome of one query against one channel for one company.
#[derive(Debug, Clone, Serialize)]
pub struct SourceResult {
    pub channel: String,
    pub domain: String,
    pub query: String,
    pub evidences: Vec<Evidence>,
    pub ok: bool,
    pub error: Option<String>,
}

impl SourceResult {
    pub fn success(
        channel: impl Into<String>,
        domain: impl Into<String>,
        query: impl Into<String>,
        evidences: Vec<Evidence>,
    ) -> Self {
        Self {
            channel: channel.into(),
            domain: domain.into(),
            query: query.into(),
            evidences,
            ok: true,
            error: None,
        }
    }

    pub fn failed(
        channel: impl Into<String>,
        domain: impl Into<String>,
        query: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            domain: domain.into(),
            query: query.into(),
            evidences: Vec::new(),
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Source: Send + Sync {
    /// Run one query for one company. Empty evidence with `ok == true` is a
    /// valid outcome (the channel had nothing to say).
    async fn fetch(&self, domain: &str, query: &str, depth: SearchDepth) -> SourceResult;
    fn name(&self) -> &'static str;
}

/// Channel name → source binding for one engine.
pub type SourceRegistry = HashMap<String, Arc<dyn Source>>;

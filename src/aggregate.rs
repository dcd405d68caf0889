//! # Evidence aggregator
//! Per-domain dedup and partial-state tracking for one run. This is the
//! only shared-mutable-state boundary in the core: every mutation and
//! snapshot happens under one mutex, so interleaved writers stay
//! consistent and progress reads never observe a half-applied update.

use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

use crate::analyze::Analysis;
use crate::model::{Evidence, Findings, ResearchResult};

/// Lowercase, entity-decode, strip tags, collapse whitespace. Shared by the
/// dedup key so the same article surfaced twice with cosmetic differences
/// collapses to one entry.
fn normalize(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(&decoded, "");
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws
        .replace_all(stripped.trim(), " ")
        .to_lowercase()
}

/// Content-addressed dedup key: SHA-256 over normalized `url|title`.
pub fn dedup_key(evidence: &Evidence) -> String {
    let content = format!("{}|{}", normalize(&evidence.url), normalize(&evidence.title));
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

#[derive(Debug)]
struct EntityState {
    evidences_by_key: HashMap<String, Evidence>,
    source_names: HashSet<String>,
    labels: Vec<String>,
    confidence: f64,
    analyzed: bool,
    last_updated: Instant,
}

impl EntityState {
    fn new() -> Self {
        Self {
            evidences_by_key: HashMap::new(),
            source_names: HashSet::new(),
            labels: Vec::new(),
            confidence: 0.0,
            analyzed: false,
            last_updated: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EvidenceAggregator {
    states: Mutex<HashMap<String, EntityState>>,
}

impl EvidenceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one evidence item for a domain. On a dedup-key collision the
    /// higher-scored duplicate wins. Returns whether the key was new.
    pub fn add_evidence(&self, domain: &str, evidence: Evidence) -> bool {
        let key = dedup_key(&evidence);
        let mut states = self.states.lock().expect("aggregator mutex poisoned");
        let state = states
            .entry(domain.to_string())
            .or_insert_with(EntityState::new);
        state.last_updated = Instant::now();

        match state.evidences_by_key.get(&key) {
            Some(existing) => {
                if evidence.score > existing.score {
                    state.evidences_by_key.insert(key, evidence);
                }
                counter!("engine_evidence_dedup_total").increment(1);
                false
            }
            None => {
                state.source_names.insert(evidence.source_name.clone());
                state.evidences_by_key.insert(key, evidence);
                counter!("engine_evidence_kept_total").increment(1);
                true
            }
        }
    }

    /// Domains that accumulated at least one evidence item.
    pub fn domains_with_evidence(&self) -> Vec<String> {
        let states = self.states.lock().expect("aggregator mutex poisoned");
        states
            .iter()
            .filter(|(_, s)| !s.evidences_by_key.is_empty())
            .map(|(d, _)| d.clone())
            .collect()
    }

    /// Snapshot of a domain's current evidence list.
    pub fn evidence_for(&self, domain: &str) -> Vec<Evidence> {
        let states = self.states.lock().expect("aggregator mutex poisoned");
        states
            .get(domain)
            .map(|s| s.evidences_by_key.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total_evidence(&self) -> usize {
        let states = self.states.lock().expect("aggregator mutex poisoned");
        states.values().map(|s| s.evidences_by_key.len()).sum()
    }

    /// Attach analysis output to a domain; later snapshots carry it.
    pub fn record_analysis(&self, domain: &str, analysis: &Analysis) {
        let mut states = self.states.lock().expect("aggregator mutex poisoned");
        let state = states
            .entry(domain.to_string())
            .or_insert_with(EntityState::new);
        state.labels = analysis.labels.clone();
        state.confidence = analysis.confidence_score.clamp(0.0, 1.0);
        state.analyzed = true;
        state.last_updated = Instant::now();
    }

    /// Point-in-time result snapshot, safe to call while writers are still
    /// running. Unknown domains yield the canonical zero-confidence result.
    pub fn build_result(&self, domain: &str) -> ResearchResult {
        let states = self.states.lock().expect("aggregator mutex poisoned");
        let Some(state) = states.get(domain) else {
            return ResearchResult::empty(domain);
        };
        let evidence: Vec<Evidence> = state.evidences_by_key.values().cloned().collect();
        ResearchResult {
            domain: domain.to_string(),
            confidence_score: (state.confidence * 100.0).round() / 100.0,
            evidence_sources: state.source_names.len(),
            findings: Findings {
                labels: state.labels.clone(),
                signals_found: state.labels.len(),
                evidence,
            },
        }
    }
}

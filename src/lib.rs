// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod aggregate;
pub mod analyze;
pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod model;
pub mod source;
pub mod stream;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::Settings;
pub use crate::engine::{EngineDeps, EngineEvent, ResearchEngine, RunSummary};
pub use crate::model::{
    BatchResearchRequest, BatchResearchResponse, Evidence, QueryStrategy, ResearchResult,
    SearchDepth,
};
pub use crate::stream::{StreamEvent, StreamProtocol};

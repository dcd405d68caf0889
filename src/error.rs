//! Per-task failure taxonomy. These never propagate out of a run; the
//! engine renders them into failed `SourceResult`s via `Display`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskFailure {
    /// A strategy referenced a channel with no registered source.
    #[error("unknown channel")]
    UnknownChannel,

    /// The channel's circuit breaker is open; the source was not invoked.
    #[error("circuit open")]
    CircuitOpen,

    /// The source call exceeded the configured per-task timeout.
    #[error("source timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Provider-side error, already stringified at the source boundary.
    #[error("{0}")]
    Source(String),
}

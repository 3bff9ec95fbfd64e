// src/error.rs - Error taxonomy for the resolution pipeline

use thiserror::Error;

/// Errors surfaced by the resolution and enrichment pipeline.
///
/// `Validation` and `TransientEnrichment` are recoverable locally: a bad
/// input row is dropped and counted, a transient search failure is retried
/// and then downgraded to a per-cluster `Error` status. `Configuration` and
/// `ResumeConflict` abort before any processing starts.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("transient enrichment failure: {0}")]
    TransientEnrichment(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resume conflict: {0}")]
    ResumeConflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ResolveResult<T> = Result<T, ResolveError>;

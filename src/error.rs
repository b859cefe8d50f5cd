//! Error taxonomy for the query engine.
//!
//! Caller data defects (`MalformedInput`, `UnsupportedSource`) are never
//! retried. External dependency failures (`EmbeddingProvider`,
//! `CompletionService`) are surfaced only after the retry policy is
//! exhausted. `DimensionMismatch` guards the index against corruption and
//! always leaves the previous index state intact.

use thiserror::Error;

use crate::models::Source;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The uploaded file cannot be normalized for its declared source.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// An inserted embedding does not match the dimensionality fixed by
    /// the source's first successful insert. The field holding the
    /// source tag must not be called `source`, which thiserror reserves
    /// for error chaining.
    #[error("dimension mismatch for source '{source_tag}': index holds {expected}-dim vectors, got {got}")]
    DimensionMismatch {
        source_tag: Source,
        expected: usize,
        got: usize,
    },

    /// The embedding provider failed after the configured retries.
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// The completion service failed after the configured retries.
    #[error("completion service error: {0}")]
    CompletionService(String),

    /// The caller named a source tag the router does not recognize.
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    /// Index persistence failed; the in-memory index is unchanged.
    #[error("storage error: {0}")]
    Storage(String),
}

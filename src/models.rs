//! Core data models used throughout the query engine.
//!
//! These types represent the documents, queries, and ranked results that
//! flow through the ingestion and retrieval pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A concrete document collection. Every persisted document and every
/// index belongs to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Qa,
    Property,
    MasterClauses,
    Lease,
}

impl Source {
    /// All concrete sources, in canonical order.
    pub const ALL: [Source; 4] = [
        Source::Qa,
        Source::Property,
        Source::MasterClauses,
        Source::Lease,
    ];

    /// The sources that make up the internal knowledge base union.
    pub const INTERNAL: [Source; 3] = [Source::Qa, Source::Property, Source::MasterClauses];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Qa => "qa",
            Source::Property => "property",
            Source::MasterClauses => "master_clauses",
            Source::Lease => "lease",
        }
    }

    pub fn is_tabular(&self) -> bool {
        !matches!(self, Source::Lease)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qa" => Ok(Source::Qa),
            "property" => Ok(Source::Property),
            "master_clauses" => Ok(Source::MasterClauses),
            "lease" => Ok(Source::Lease),
            other => Err(EngineError::UnsupportedSource(other.to_string())),
        }
    }
}

/// What the caller asked to query: a concrete source, the internal
/// union, or router-resolved auto dispatch. Never a storage tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSelector {
    Auto,
    Internal,
    Concrete(Source),
}

impl SourceSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSelector::Auto => "auto",
            SourceSelector::Internal => "internal",
            SourceSelector::Concrete(s) => s.as_str(),
        }
    }
}

impl FromStr for SourceSelector {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SourceSelector::Auto),
            "internal" => Ok(SourceSelector::Internal),
            other => Ok(SourceSelector::Concrete(other.parse()?)),
        }
    }
}

/// Query mode: `general` may reach every collection, `internal` is
/// restricted to the internal knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    General,
    Internal,
}

impl FromStr for QueryMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(QueryMode::General),
            "internal" => Ok(QueryMode::Internal),
            other => Err(EngineError::UnsupportedSource(format!(
                "unknown query mode '{other}', expected 'general' or 'internal'"
            ))),
        }
    }
}

/// How ranked candidates from the resolved sources are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fusion {
    /// One source queried, its ranking passes through unchanged.
    Single,
    /// All candidates merged and re-ranked by score.
    UnionRank,
}

/// A normalized document. The embedding lives in the index entry, not
/// here: a document carries a vector exactly when it has been indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable, content-derived identifier (`<source>-<sha256 prefix>`).
    pub id: String,
    pub source: Source,
    /// Text used for embedding and retrieval display.
    pub text: String,
    /// Original row fields (tabular) or chunk provenance (free text).
    pub metadata: BTreeMap<String, String>,
}

/// A retrieval request, constructed per query and never persisted.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    pub source: SourceSelector,
    pub mode: QueryMode,
    pub top_k: usize,
}

/// One ranked passage in a [`RetrievalResult`].
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub document_id: String,
    pub source: Source,
    pub score: f32,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// Ordered retrieval output: at most `top_k` passages, scores
/// non-increasing. An empty result is a valid "no relevant passages"
/// state, not an error.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub passages: Vec<RetrievedPassage>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Whether an ingest appends to or atomically replaces a source index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Append,
    Replace,
}

impl FromStr for IngestMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(IngestMode::Append),
            "replace" => Ok(IngestMode::Replace),
            other => Err(EngineError::MalformedInput(format!(
                "unknown ingest mode '{other}', expected 'append' or 'replace'"
            ))),
        }
    }
}

/// Outcome of an ingestion run. `accepted + skipped` always equals the
/// number of input rows (or text windows).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub source: Source,
    pub accepted: usize,
    pub skipped: usize,
}

/// Read-only index statistics for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub document_count: usize,
    pub dimensionality: usize,
}

/// A citation attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitedSource {
    pub source: Source,
    pub document_id: String,
    pub score: f32,
}

/// Final answer returned across the query boundary.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub cited_sources: Vec<CitedSource>,
}

/// Record emitted after each answered query for the conversation store
/// collaborator to persist. The engine never reads these back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub user_id: Option<String>,
    pub question: String,
    pub answer: String,
    pub sources_used: Vec<CitedSource>,
    pub asked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_roundtrip() {
        for s in Source::ALL {
            assert_eq!(s.as_str().parse::<Source>().unwrap(), s);
        }
    }

    #[test]
    fn test_unknown_source_rejected() {
        let err = "crm".parse::<Source>().unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedSource(_)));
    }

    #[test]
    fn test_selector_parses_virtual_tags() {
        assert_eq!("auto".parse::<SourceSelector>().unwrap(), SourceSelector::Auto);
        assert_eq!(
            "internal".parse::<SourceSelector>().unwrap(),
            SourceSelector::Internal
        );
        assert_eq!(
            "lease".parse::<SourceSelector>().unwrap(),
            SourceSelector::Concrete(Source::Lease)
        );
    }

    #[test]
    fn test_internal_union_members() {
        assert!(!Source::INTERNAL.contains(&Source::Lease));
        assert_eq!(Source::INTERNAL.len(), 3);
    }
}

//! Retrieval across one or more source indexes.
//!
//! The query is embedded once, fanned out to each routed source with
//! the same depth, and the per-source result lists are fused into one
//! ranking. The minimum-score cutoff applies after fusion so a weak
//! source cannot dilute a strong one.

use tracing::debug;

use crate::config::Config;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::EngineError;
use crate::models::{Fusion, QueryRequest, RetrievalResult, RetrievedPassage};
use crate::router;
use crate::store::IndexStore;

/// Run one retrieval request end to end.
pub async fn retrieve(
    store: &IndexStore,
    provider: &dyn EmbeddingProvider,
    config: &Config,
    request: &QueryRequest,
) -> Result<RetrievalResult, EngineError> {
    if request.text.trim().is_empty() {
        return Err(EngineError::MalformedInput("empty query text".to_string()));
    }

    let route = router::resolve(&request.source, request.mode)?;
    let top_k = if request.top_k == 0 {
        config.retrieval.top_k
    } else {
        request.top_k
    };

    let query_embedding = embed_query(provider, &config.embedding, &request.text).await?;

    let mut per_source = Vec::with_capacity(route.sources.len());
    for source in &route.sources {
        let hits = store.query(*source, &query_embedding, top_k)?;
        debug!(source = %source, hits = hits.len(), "source queried");
        per_source.push(hits);
    }

    let passages = fuse(per_source, route.fusion, top_k, config.retrieval.min_score);
    Ok(RetrievalResult { passages })
}

/// Merge per-source result lists into one ranking, drop passages below
/// `min_score`, and keep the best `top_k`.
///
/// Ties break by score descending, then source name ascending, then
/// document id ascending, so a fused ranking is reproducible across
/// runs regardless of source iteration order.
pub fn fuse(
    per_source: Vec<Vec<RetrievedPassage>>,
    fusion: Fusion,
    top_k: usize,
    min_score: f32,
) -> Vec<RetrievedPassage> {
    let mut merged: Vec<RetrievedPassage> = match fusion {
        Fusion::Single => per_source.into_iter().next().unwrap_or_default(),
        Fusion::UnionRank => per_source.into_iter().flatten().collect(),
    };

    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source.as_str().cmp(b.source.as_str()))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    merged.retain(|p| p.score >= min_score);
    merged.truncate(top_k);
    merged
}

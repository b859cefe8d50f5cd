//! The ingestion pipeline: normalize, embed, index.
//!
//! Stages run strictly in order and the index is only touched after
//! every embedding has arrived, so an embedding failure midway through
//! a batch leaves the previous index fully intact. The index write
//! itself (snapshot build plus file persistence) runs on a blocking
//! thread so it never stalls the async executor.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::{embed_texts, EmbeddingProvider};
use crate::error::EngineError;
use crate::models::{IngestMode, IngestReport, Source};
use crate::normalize::normalize;
use crate::store::IndexStore;

/// Ingest one raw upload into a source's index.
pub async fn ingest(
    store: Arc<IndexStore>,
    provider: &dyn EmbeddingProvider,
    config: &Config,
    source: Source,
    raw: &[u8],
    mode: IngestMode,
) -> Result<IngestReport, EngineError> {
    let batch = normalize(raw, source, &config.chunking)?;
    info!(
        source = %source,
        rows = batch.total_rows,
        accepted = batch.documents.len(),
        skipped = batch.skipped,
        "normalized upload"
    );

    let report = IngestReport {
        source,
        accepted: batch.documents.len(),
        skipped: batch.skipped,
    };

    // A batch that normalized to nothing is reported, not indexed:
    // replace mode must not wipe an index over an all-bad upload.
    if batch.documents.is_empty() {
        warn!(source = %source, "upload produced no documents, index unchanged");
        return Ok(report);
    }

    let texts: Vec<String> = batch.documents.iter().map(|d| d.text.clone()).collect();
    let embeddings = embed_texts(provider, &config.embedding, &texts).await?;

    let documents = batch.documents;
    tokio::task::spawn_blocking(move || match mode {
        IngestMode::Append => store.upsert(source, documents, embeddings),
        IngestMode::Replace => store.replace(source, documents, embeddings),
    })
    .await
    .map_err(|e| EngineError::Storage(format!("index write task failed: {e}")))??;

    info!(
        source = %source,
        documents = report.accepted,
        mode = ?mode,
        "ingest complete"
    );
    Ok(report)
}

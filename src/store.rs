//! Per-source vector index store.
//!
//! Each source owns one immutable [`IndexSnapshot`] behind an `Arc`.
//! Writers serialize on a per-source mutex, build a complete new
//! snapshot outside the map lock, and take the map lock only for the
//! final pointer swap; readers clone the `Arc` under a short read lock
//! and score with no lock held. A query therefore observes either the
//! pre-write or post-write index in full, never a partial mix, and a
//! rebuild blocks neither readers nor writers of other sources.
//!
//! When a data directory is configured, every successful write persists
//! the new snapshot to `<data_dir>/<source>.json` via a temp file and
//! atomic rename before the in-memory swap, so a failed write leaves
//! both disk and memory on the previous state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embedding::cosine_similarity;
use crate::error::EngineError;
use crate::models::{Document, RetrievedPassage, Source, SourceStats};

/// One indexed document with its embedding. The embedding is present
/// exactly because the document has been indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub document: Document,
    pub embedding: Vec<f32>,
}

/// An immutable index for one source: dimensionality plus entries
/// sorted by document id.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub dims: usize,
    pub entries: Vec<IndexEntry>,
}

/// Persisted snapshot envelope; the version guards future migrations.
#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    dims: usize,
    entries: Vec<IndexEntry>,
}

const SNAPSHOT_VERSION: u32 = 1;

pub struct IndexStore {
    data_dir: Option<PathBuf>,
    shards: RwLock<HashMap<Source, Arc<IndexSnapshot>>>,
    /// Serializes writers per source. The map-wide lock above is only
    /// taken for pointer reads and the final swap, so a rebuild of one
    /// source never blocks queries on another.
    writers: HashMap<Source, Mutex<()>>,
}

fn writer_locks() -> HashMap<Source, Mutex<()>> {
    Source::ALL.into_iter().map(|s| (s, Mutex::new(()))).collect()
}

impl IndexStore {
    /// A purely in-memory store, used by tests and embedding-free tools.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            shards: RwLock::new(HashMap::new()),
            writers: writer_locks(),
        }
    }

    /// Open a store backed by `data_dir`, loading any persisted
    /// snapshots. A missing file is an empty index, not an error.
    pub fn open(data_dir: &Path) -> Result<Self, EngineError> {
        fs::create_dir_all(data_dir)
            .map_err(|e| EngineError::Storage(format!("cannot create {}: {e}", data_dir.display())))?;

        let mut shards = HashMap::new();
        for source in Source::ALL {
            let path = snapshot_path(data_dir, source);
            if !path.exists() {
                continue;
            }
            let raw = fs::read(&path)
                .map_err(|e| EngineError::Storage(format!("cannot read {}: {e}", path.display())))?;
            let file: SnapshotFile = serde_json::from_slice(&raw)
                .map_err(|e| EngineError::Storage(format!("corrupt index {}: {e}", path.display())))?;
            debug!(source = %source, documents = file.entries.len(), "loaded index snapshot");
            shards.insert(
                source,
                Arc::new(IndexSnapshot {
                    dims: file.dims,
                    entries: file.entries,
                }),
            );
        }

        Ok(Self {
            data_dir: Some(data_dir.to_path_buf()),
            shards: RwLock::new(shards),
            writers: writer_locks(),
        })
    }

    /// Insert or update documents in a source's index. Entries with a
    /// matching id are replaced, the rest are appended.
    pub fn upsert(
        &self,
        source: Source,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), EngineError> {
        self.write(source, documents, embeddings, false)
    }

    /// Atomically replace a source's index with the given batch.
    pub fn replace(
        &self,
        source: Source,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), EngineError> {
        self.write(source, documents, embeddings, true)
    }

    fn write(
        &self,
        source: Source,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f32>>,
        replace: bool,
    ) -> Result<(), EngineError> {
        if documents.len() != embeddings.len() {
            return Err(EngineError::Storage(format!(
                "{} documents but {} embeddings",
                documents.len(),
                embeddings.len()
            )));
        }

        // Holding this source's writer lock keeps the snapshot read
        // below and the swap at the end atomic against other writers,
        // without touching writers or readers of any other source.
        let _writer = self.writers[&source].lock().unwrap();

        let current = self.shards.read().unwrap().get(&source).cloned();
        let dims = if replace {
            embeddings.first().map(|v| v.len()).unwrap_or(0)
        } else {
            match &current {
                Some(snap) if snap.dims > 0 => snap.dims,
                _ => embeddings.first().map(|v| v.len()).unwrap_or(0),
            }
        };

        // Validate the whole batch before touching anything.
        for vector in &embeddings {
            if vector.len() != dims {
                return Err(EngineError::DimensionMismatch {
                    source_tag: source,
                    expected: dims,
                    got: vector.len(),
                });
            }
        }

        let mut entries: Vec<IndexEntry> = if replace {
            Vec::with_capacity(documents.len())
        } else {
            current
                .as_ref()
                .map(|snap| snap.entries.clone())
                .unwrap_or_default()
        };

        let mut by_id: HashMap<String, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.document.id.clone(), i))
            .collect();

        for (document, embedding) in documents.into_iter().zip(embeddings) {
            match by_id.get(&document.id) {
                Some(&i) => {
                    entries[i].document = document;
                    entries[i].embedding = embedding;
                }
                None => {
                    by_id.insert(document.id.clone(), entries.len());
                    entries.push(IndexEntry {
                        document,
                        embedding,
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.document.id.cmp(&b.document.id));

        let snapshot = Arc::new(IndexSnapshot { dims, entries });

        // Persist before swapping: a failed write must leave the
        // previous index visible in memory and on disk.
        if let Some(dir) = &self.data_dir {
            persist(dir, source, &snapshot)?;
        }

        info!(
            source = %source,
            documents = snapshot.entries.len(),
            dims = snapshot.dims,
            replace,
            "index updated"
        );
        self.shards.write().unwrap().insert(source, snapshot);
        Ok(())
    }

    /// Rank a source's documents against `query_embedding` by cosine
    /// similarity, ties broken by document id ascending. An empty or
    /// absent index returns an empty vector.
    pub fn query(
        &self,
        source: Source,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, EngineError> {
        let snapshot = {
            let shards = self.shards.read().unwrap();
            match shards.get(&source) {
                Some(snap) => Arc::clone(snap),
                None => return Ok(Vec::new()),
            }
        };

        if snapshot.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query_embedding.len() != snapshot.dims {
            return Err(EngineError::DimensionMismatch {
                source_tag: source,
                expected: snapshot.dims,
                got: query_embedding.len(),
            });
        }

        let mut scored: Vec<RetrievedPassage> = snapshot
            .entries
            .iter()
            .map(|entry| RetrievedPassage {
                document_id: entry.document.id.clone(),
                source,
                score: cosine_similarity(query_embedding, &entry.embedding),
                text: entry.document.text.clone(),
                metadata: entry.document.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn stats(&self, source: Source) -> SourceStats {
        let shards = self.shards.read().unwrap();
        match shards.get(&source) {
            Some(snap) => SourceStats {
                document_count: snap.entries.len(),
                dimensionality: snap.dims,
            },
            None => SourceStats {
                document_count: 0,
                dimensionality: 0,
            },
        }
    }

    /// Sources currently holding at least one document, in canonical order.
    pub fn list_sources(&self) -> Vec<Source> {
        let shards = self.shards.read().unwrap();
        Source::ALL
            .into_iter()
            .filter(|s| shards.get(s).map(|snap| !snap.entries.is_empty()).unwrap_or(false))
            .collect()
    }
}

fn snapshot_path(dir: &Path, source: Source) -> PathBuf {
    dir.join(format!("{source}.json"))
}

fn persist(dir: &Path, source: Source, snapshot: &IndexSnapshot) -> Result<(), EngineError> {
    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        dims: snapshot.dims,
        entries: snapshot.entries.clone(),
    };
    let payload = serde_json::to_vec(&file)
        .map_err(|e| EngineError::Storage(format!("cannot serialize index: {e}")))?;

    let path = snapshot_path(dir, source);
    let tmp = dir.join(format!("{source}.json.tmp"));
    fs::write(&tmp, payload)
        .map_err(|e| EngineError::Storage(format!("cannot write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, &path)
        .map_err(|e| EngineError::Storage(format!("cannot rename {}: {e}", path.display())))?;
    Ok(())
}

//! The query engine facade: one struct wiring store, embedding
//! provider, completion client, and conversation log together.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};

use crate::completion::{self, CompletionClient};
use crate::config::Config;
use crate::context;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::EngineError;
use crate::models::{
    AnswerResponse, CitedSource, ConversationRecord, IngestMode, IngestReport, QueryRequest,
    RetrievalResult, Source, SourceStats,
};
use crate::pipeline;
use crate::retrieve;
use crate::store::IndexStore;

const NO_ANSWER: &str =
    "I do not have enough information in the knowledge bases to answer that.";

/// Where answered conversations are recorded.
pub trait ConversationSink: Send + Sync {
    fn record(&self, record: &ConversationRecord) -> Result<(), EngineError>;
}

/// Appends one JSON object per conversation to a `.jsonl` file.
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

impl ConversationSink for JsonlSink {
    fn record(&self, record: &ConversationRecord) -> Result<(), EngineError> {
        let line = serde_json::to_string(record)
            .map_err(|e| EngineError::Storage(format!("cannot serialize conversation: {e}")))?;
        let _guard = self.lock.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                EngineError::Storage(format!("cannot open {}: {e}", self.path.display()))
            })?;
        writeln!(file, "{line}")
            .map_err(|e| EngineError::Storage(format!("cannot append conversation: {e}")))?;
        Ok(())
    }
}

pub struct QueryEngine {
    config: Config,
    store: Arc<IndexStore>,
    /// Built on first use, never at construction: read-only inspection
    /// (`stats`, `list_sources`) must work with no provider credentials.
    embedder: Mutex<Option<Arc<dyn EmbeddingProvider>>>,
    completion: Mutex<Option<Option<Arc<dyn CompletionClient>>>>,
    sink: Option<Box<dyn ConversationSink>>,
}

impl QueryEngine {
    /// Build an engine from configuration: persistent store and a
    /// conversation log next to the index files. The embedding and
    /// completion clients are constructed lazily, on the first call
    /// that needs them.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        let store = Arc::new(IndexStore::open(&config.storage.data_dir)?);
        let sink: Box<dyn ConversationSink> =
            Box::new(JsonlSink::new(config.storage.data_dir.join("conversations.jsonl")));

        Ok(Self {
            config,
            store,
            embedder: Mutex::new(None),
            completion: Mutex::new(None),
            sink: Some(sink),
        })
    }

    /// Assemble an engine from explicit parts. Used by tests and by
    /// callers that bring their own provider implementations.
    pub fn with_components(
        config: Config,
        store: IndexStore,
        embedder: Box<dyn EmbeddingProvider>,
        completion: Option<Box<dyn CompletionClient>>,
        sink: Option<Box<dyn ConversationSink>>,
    ) -> Self {
        Self {
            config,
            store: Arc::new(store),
            embedder: Mutex::new(Some(Arc::from(embedder))),
            completion: Mutex::new(Some(completion.map(Arc::from))),
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, EngineError> {
        let mut slot = self.embedder.lock().unwrap();
        if let Some(provider) = &*slot {
            return Ok(Arc::clone(provider));
        }
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&self.config.embedding)?);
        *slot = Some(Arc::clone(&provider));
        Ok(provider)
    }

    fn completion_client(&self) -> Result<Option<Arc<dyn CompletionClient>>, EngineError> {
        let mut slot = self.completion.lock().unwrap();
        if let Some(resolved) = &*slot {
            return Ok(resolved.clone());
        }
        let client: Option<Arc<dyn CompletionClient>> =
            completion::create_client(&self.config.completion)?.map(Arc::from);
        *slot = Some(client.clone());
        Ok(client)
    }

    pub async fn ingest_bytes(
        &self,
        source: Source,
        raw: &[u8],
        mode: IngestMode,
    ) -> Result<IngestReport, EngineError> {
        let provider = self.embedder()?;
        pipeline::ingest(
            Arc::clone(&self.store),
            provider.as_ref(),
            &self.config,
            source,
            raw,
            mode,
        )
        .await
    }

    pub async fn ingest_file(
        &self,
        path: &Path,
        source: Source,
        mode: IngestMode,
    ) -> Result<IngestReport, EngineError> {
        let raw = std::fs::read(path)
            .map_err(|e| EngineError::Storage(format!("cannot read {}: {e}", path.display())))?;
        self.ingest_bytes(source, &raw, mode).await
    }

    pub async fn retrieve(&self, request: &QueryRequest) -> Result<RetrievalResult, EngineError> {
        let provider = self.embedder()?;
        retrieve::retrieve(&self.store, provider.as_ref(), &self.config, request).await
    }

    /// Answer a question: retrieve, assemble a prompt, and either call
    /// the completion service or fall back to an extractive answer.
    /// The conversation is logged after the answer is produced; a log
    /// failure is reported but does not fail the request.
    pub async fn ask(
        &self,
        request: &QueryRequest,
        user_id: Option<String>,
    ) -> Result<AnswerResponse, EngineError> {
        let result = self.retrieve(request).await?;
        let (prompt, included) =
            context::assemble(&request.text, &result, self.config.context.max_chars);

        let cited_sources: Vec<CitedSource> = included
            .iter()
            .map(|p| CitedSource {
                source: p.source,
                document_id: p.document_id.clone(),
                score: p.score,
            })
            .collect();

        let client = self.completion_client()?;
        let answer = match &client {
            Some(client) => completion::complete(client.as_ref(), &self.config.completion, &prompt)
                .await?,
            None => extractive_answer(&result),
        };

        info!(
            question_chars = request.text.len(),
            cited = cited_sources.len(),
            generated = client.is_some(),
            "question answered"
        );

        if let Some(sink) = &self.sink {
            let record = ConversationRecord {
                user_id,
                question: request.text.clone(),
                answer: answer.clone(),
                sources_used: cited_sources.clone(),
                asked_at: Utc::now(),
            };
            if let Err(e) = sink.record(&record) {
                warn!(error = %e, "failed to record conversation");
            }
        }

        Ok(AnswerResponse {
            answer,
            cited_sources,
        })
    }

    pub fn stats(&self, source: Source) -> SourceStats {
        self.store.stats(source)
    }

    pub fn list_sources(&self) -> Vec<Source> {
        self.store.list_sources()
    }
}

/// Without a completion service, answer with the single best passage.
fn extractive_answer(result: &RetrievalResult) -> String {
    match result.passages.first() {
        Some(best) => best.text.clone(),
        None => NO_ANSWER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedPassage;
    use std::collections::BTreeMap;

    #[test]
    fn test_extractive_answer_uses_best_passage() {
        let result = RetrievalResult {
            passages: vec![
                RetrievedPassage {
                    document_id: "qa-1".to_string(),
                    source: Source::Qa,
                    score: 0.9,
                    text: "Rent is due on the first.".to_string(),
                    metadata: BTreeMap::new(),
                },
                RetrievedPassage {
                    document_id: "qa-2".to_string(),
                    source: Source::Qa,
                    score: 0.5,
                    text: "Late fees apply after five days.".to_string(),
                    metadata: BTreeMap::new(),
                },
            ],
        };
        assert_eq!(extractive_answer(&result), "Rent is due on the first.");
    }

    #[test]
    fn test_extractive_answer_without_passages() {
        let result = RetrievalResult { passages: vec![] };
        assert_eq!(extractive_answer(&result), NO_ANSWER);
    }

    #[test]
    fn test_inspection_needs_no_provider_credentials() {
        std::env::remove_var("OPENAI_API_KEY");
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();
        config.embedding.model = Some("text-embedding-3-small".to_string());

        let engine = QueryEngine::from_config(config).unwrap();
        assert_eq!(engine.stats(Source::Qa).document_count, 0);
        assert!(engine.list_sources().is_empty());
    }

    #[tokio::test]
    async fn test_query_surfaces_missing_credentials() {
        std::env::remove_var("OPENAI_API_KEY");
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();
        config.embedding.model = Some("text-embedding-3-small".to_string());

        let engine = QueryEngine::from_config(config).unwrap();
        let request = crate::models::QueryRequest {
            text: "anything".to_string(),
            source: crate::models::SourceSelector::Auto,
            mode: crate::models::QueryMode::General,
            top_k: 3,
        };
        let err = engine.retrieve(&request).await.unwrap_err();
        assert!(matches!(err, crate::error::EngineError::EmbeddingProvider(_)));
    }

    #[test]
    fn test_jsonl_sink_appends_records() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("conversations.jsonl");
        let sink = JsonlSink::new(path.clone());

        for i in 0..2 {
            let record = ConversationRecord {
                user_id: Some(format!("user-{i}")),
                question: "When is rent due?".to_string(),
                answer: "On the first.".to_string(),
                sources_used: vec![],
                asked_at: Utc::now(),
            };
            sink.record(&record).unwrap();
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: ConversationRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.user_id.as_deref(), Some("user-1"));
    }
}

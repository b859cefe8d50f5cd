//! Embedding provider abstraction and implementations.
//!
//! The [`EmbeddingProvider`] trait is the seam between the engine and
//! the external embedding service. [`embed_texts`] is the main entry
//! point: it batches requests, runs each batch under the shared retry
//! policy, and guarantees the output matches the input in length and
//! order — a short response aborts the whole call rather than
//! returning a partially filled result.
//!
//! Providers are not assumed deterministic across calls; the engine
//! only relies on order within one batch.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EngineError;
use crate::retry::{CallError, RetryPolicy};

/// An external `text -> vector` service, called one batch at a time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;

    /// Embed one batch. Implementations classify failures as transient
    /// or fatal; retrying is the caller's job.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CallError>;
}

/// Embed `texts` in configured-size batches with retry. The returned
/// vectors match the input slice in length and order.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EngineError> {
    let policy = RetryPolicy::new(config.max_retries);
    let batch_size = config.batch_size.max(1);
    let mut out = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let vectors = policy
            .run("embedding", || provider.embed_batch(batch))
            .await
            .map_err(EngineError::EmbeddingProvider)?;

        if vectors.len() != batch.len() {
            return Err(EngineError::EmbeddingProvider(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }
        out.extend(vectors);
    }

    Ok(out)
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>, EngineError> {
    let results = embed_texts(provider, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::EmbeddingProvider("empty embedding response".into()))
}

/// Instantiate the provider named in the configuration.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>, EngineError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbeddings::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbeddings::new(config)?)),
        other => Err(EngineError::EmbeddingProvider(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

// ============ OpenAI provider ============

/// Calls `POST /v1/embeddings` on the OpenAI API (or a compatible
/// endpoint via `embedding.url`). Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbeddings {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EngineError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| EngineError::EmbeddingProvider("embedding.model required".into()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EngineError::EmbeddingProvider("OPENAI_API_KEY not set".into()))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::EmbeddingProvider(e.to_string()))?;

        Ok(Self {
            model,
            url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CallError> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Transient(format!("request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            let payload: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| CallError::Transient(format!("bad response body: {e}")))?;
            parse_openai_embeddings(&payload)
        } else if status.as_u16() == 429 || status.is_server_error() {
            let text = resp.text().await.unwrap_or_default();
            Err(CallError::Transient(format!("API error {status}: {text}")))
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(CallError::Fatal(format!("API error {status}: {text}")))
        }
    }
}

/// Extract `data[].embedding`, re-ordered by the `index` field so the
/// output matches the input order.
fn parse_openai_embeddings(payload: &serde_json::Value) -> Result<Vec<Vec<f32>>, CallError> {
    let data = payload
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| CallError::Fatal("invalid response: missing data array".into()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let components = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| CallError::Fatal("invalid response: missing embedding".into()))?;
        indexed.push((index, parse_components(components)?));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama provider ============

/// Calls `POST /api/embed` on a local Ollama instance.
pub struct OllamaEmbeddings {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EngineError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| EngineError::EmbeddingProvider("embedding.model required".into()))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::EmbeddingProvider(e.to_string()))?;

        Ok(Self { model, url, client })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CallError> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                CallError::Transient(format!(
                    "connection error (is Ollama running at {}?): {e}",
                    self.url
                ))
            })?;

        let status = resp.status();
        if status.is_success() {
            let payload: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| CallError::Transient(format!("bad response body: {e}")))?;
            parse_ollama_embeddings(&payload)
        } else if status.as_u16() == 429 || status.is_server_error() {
            let text = resp.text().await.unwrap_or_default();
            Err(CallError::Transient(format!("API error {status}: {text}")))
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(CallError::Fatal(format!("API error {status}: {text}")))
        }
    }
}

fn parse_ollama_embeddings(payload: &serde_json::Value) -> Result<Vec<Vec<f32>>, CallError> {
    let embeddings = payload
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| CallError::Fatal("invalid response: missing embeddings array".into()))?;

    let mut out = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let components = embedding
            .as_array()
            .ok_or_else(|| CallError::Fatal("invalid response: embedding is not an array".into()))?;
        out.push(parse_components(components)?);
    }
    Ok(out)
}

/// A non-numeric component is a shape violation, not a zero.
fn parse_components(components: &[serde_json::Value]) -> Result<Vec<f32>, CallError> {
    components
        .iter()
        .map(|v| {
            v.as_f64().map(|n| n as f32).ok_or_else(|| {
                CallError::Fatal(format!("invalid response: non-numeric embedding component {v}"))
            })
        })
        .collect()
}

// ============ Vector math ============

/// Cosine similarity between two vectors: `1.0` identical direction,
/// `0.0` orthogonal, `-1.0` opposite. Returns `0.0` for empty or
/// mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingProvider {
        batches: AtomicUsize,
        fail_first: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CallError> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(CallError::Transient("rate limited".into()));
            }
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn config(batch_size: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            batch_size,
            max_retries: 3,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_batching_preserves_order() {
        let provider = RecordingProvider {
            batches: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(0),
        };
        let texts: Vec<String> = vec!["a".into(), "bb".into(), "ccc".into(), "dddd".into(), "e".into()];
        let vectors = embed_texts(&provider, &config(2), &texts).await.unwrap();
        assert_eq!(vectors.len(), 5);
        let lens: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 1.0]);
        assert_eq!(provider.batches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let provider = RecordingProvider {
            batches: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(1),
        };
        let texts = vec!["hello".to_string()];
        let vectors = embed_texts(&provider, &config(8), &texts).await.unwrap();
        assert_eq!(vectors.len(), 1);
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn model_name(&self) -> &str {
            "short"
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, CallError> {
            Ok(vec![vec![1.0]])
        }
    }

    #[tokio::test]
    async fn test_short_response_is_an_error() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embed_texts(&ShortProvider, &config(8), &texts)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmbeddingProvider(_)));
    }

    #[test]
    fn test_parse_openai_reorders_by_index() {
        let payload = json!({
            "data": [
                {"index": 1, "embedding": [2.0]},
                {"index": 0, "embedding": [1.0]},
            ]
        });
        let vectors = parse_openai_embeddings(&payload).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_parse_openai_rejects_non_numeric_component() {
        let payload = json!({
            "data": [
                {"index": 0, "embedding": [1.0, "oops", 3.0]},
            ]
        });
        let err = parse_openai_embeddings(&payload).unwrap_err();
        assert!(matches!(err, CallError::Fatal(_)));
    }

    #[test]
    fn test_parse_ollama_rejects_non_numeric_component() {
        let payload = json!({ "embeddings": [[0.5, null]] });
        let err = parse_ollama_embeddings(&payload).unwrap_err();
        assert!(matches!(err, CallError::Fatal(_)));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}

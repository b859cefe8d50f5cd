//! Document normalizer: turns an uploaded file into [`Document`]s.
//!
//! Tabular sources (`qa`, `property`, `master_clauses`) produce one
//! document per CSV row; the searchable text is a deterministic
//! rendering of a fixed, source-specific subset of columns, while the
//! metadata retains every original column. Free-text sources (`lease`)
//! are split by the sliding-window chunker.
//!
//! A file that cannot be normalized at all (missing required columns,
//! empty input) fails with `MalformedInput`. A row that cannot be
//! normalized is skipped and counted, never silently dropped.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::chunk;
use crate::config::ChunkingConfig;
use crate::error::EngineError;
use crate::models::{Document, Source};

/// Columns that must be present in the header for each tabular source.
const QA_REQUIRED: &[&str] = &["question", "answer"];
const PROPERTY_REQUIRED: &[&str] = &["Property Address"];
const MASTER_CLAUSES_REQUIRED: &[&str] = &["Document Name"];

/// Key clause terms rendered into master-clause search text, in order.
const CLAUSE_TERMS: &[&str] = &[
    "Agreement Date",
    "Effective Date",
    "Expiration Date",
    "Renewal Term",
    "Governing Law",
    "Non-Compete",
    "Exclusivity",
    "Termination For Convenience",
    "Anti-Assignment",
    "License Grant",
    "Warranty Duration",
    "Insurance",
];

/// Normalizer output: documents plus per-row skip accounting.
/// `documents.len() + skipped == total_rows` always holds.
#[derive(Debug)]
pub struct NormalizedBatch {
    pub documents: Vec<Document>,
    pub skipped: usize,
    pub total_rows: usize,
}

/// Normalize a raw upload for its declared source. Documents come back
/// without embeddings; they are not queryable until indexed.
pub fn normalize(
    raw: &[u8],
    source: Source,
    chunking: &ChunkingConfig,
) -> Result<NormalizedBatch, EngineError> {
    if source.is_tabular() {
        normalize_tabular(raw, source)
    } else {
        normalize_free_text(raw, source, chunking)
    }
}

fn normalize_tabular(raw: &[u8], source: Source) -> Result<NormalizedBatch, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EngineError::MalformedInput(format!("unreadable CSV header: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let required = required_columns(source);
    let missing: Vec<&str> = required
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::MalformedInput(format!(
            "source '{source}' requires columns {missing:?}, found {headers:?}"
        )));
    }

    let mut documents = Vec::new();
    let mut skipped = 0usize;
    let mut total_rows = 0usize;

    for (row_idx, record) in reader.records().enumerate() {
        total_rows += 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(source = %source, row = row_idx, error = %e, "skipping unreadable row");
                skipped += 1;
                continue;
            }
        };

        let row: BTreeMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();

        let text = match row_text(source, &row) {
            Some(t) => t,
            None => {
                warn!(source = %source, row = row_idx, "skipping row with empty required fields");
                skipped += 1;
                continue;
            }
        };

        documents.push(Document {
            id: document_id(source, row_idx, &text),
            source,
            text,
            metadata: row,
        });
    }

    if total_rows == 0 {
        return Err(EngineError::MalformedInput(format!(
            "source '{source}' upload contains no data rows"
        )));
    }

    Ok(NormalizedBatch {
        documents,
        skipped,
        total_rows,
    })
}

fn normalize_free_text(
    raw: &[u8],
    source: Source,
    chunking: &ChunkingConfig,
) -> Result<NormalizedBatch, EngineError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| EngineError::MalformedInput("free-text upload is not valid UTF-8".into()))?;

    let windows = chunk::windows(text, chunking.window_chars, chunking.overlap_chars);
    if windows.is_empty() {
        return Err(EngineError::MalformedInput(format!(
            "source '{source}' upload is empty"
        )));
    }

    let total = windows.len();
    let documents = windows
        .into_iter()
        .enumerate()
        .map(|(i, window)| {
            let mut metadata = BTreeMap::new();
            metadata.insert("chunk_index".to_string(), i.to_string());
            Document {
                id: document_id(source, i, &window),
                source,
                text: window,
                metadata,
            }
        })
        .collect();

    Ok(NormalizedBatch {
        documents,
        skipped: 0,
        total_rows: total,
    })
}

fn required_columns(source: Source) -> &'static [&'static str] {
    match source {
        Source::Qa => QA_REQUIRED,
        Source::Property => PROPERTY_REQUIRED,
        Source::MasterClauses => MASTER_CLAUSES_REQUIRED,
        Source::Lease => &[],
    }
}

/// Render the searchable text for one row, or `None` if the row lacks
/// the fields its source requires.
fn row_text(source: Source, row: &BTreeMap<String, String>) -> Option<String> {
    match source {
        Source::Qa => qa_text(row),
        Source::Property => property_text(row),
        Source::MasterClauses => master_clauses_text(row),
        Source::Lease => None,
    }
}

fn qa_text(row: &BTreeMap<String, String>) -> Option<String> {
    let question = non_empty(row, "question")?;
    let answer = non_empty(row, "answer")?;
    Some(format!("Question: {question}\nAnswer: {answer}"))
}

fn property_text(row: &BTreeMap<String, String>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(v) = non_empty(row, "Property Address") {
        parts.push(format!("Property: {v}"));
    } else {
        return None;
    }
    if let Some(v) = non_empty(row, "Floor") {
        parts.push(format!("Floor: {v}"));
    }
    if let Some(v) = non_empty(row, "Suite") {
        parts.push(format!("Suite: {v}"));
    }
    if let Some(v) = non_empty(row, "Size (SF)") {
        parts.push(format!("Size: {v} SF"));
    }
    if let Some(v) = non_empty(row, "Rent/SF/Year") {
        parts.push(format!("Rent per SF: ${v}"));
    }
    if let Some(v) = non_empty(row, "Annual Rent") {
        parts.push(format!("Annual Rent: ${v}"));
    }
    if let Some(v) = non_empty(row, "Monthly Rent") {
        parts.push(format!("Monthly Rent: ${v}"));
    }
    if let Some(v) = non_empty(row, "Associate 1") {
        parts.push(format!("Associate: {v}"));
    }
    if let Some(v) = non_empty(row, "BROKER Email ID") {
        parts.push(format!("Broker: {v}"));
    }
    Some(parts.join(" | "))
}

fn master_clauses_text(row: &BTreeMap<String, String>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(v) = non_empty(row, "Document Name") {
        parts.push(format!("Document: {v}"));
    } else {
        return None;
    }
    if let Some(v) = non_empty(row, "Parties") {
        parts.push(format!("Parties: {v}"));
    }
    for term in CLAUSE_TERMS {
        let answer_col = format!("{term}-Answer");
        if non_empty(row, term).is_some() {
            if let Some(answer) = non_empty(row, &answer_col) {
                parts.push(format!("{term}: {answer}"));
            }
        }
    }
    Some(parts.join(" | "))
}

fn non_empty<'a>(row: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    row.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Stable content-derived id: `<source>-<12 hex of sha256>`, hashing
/// the source tag, the row/window ordinal, and the rendered text.
fn document_id(source: Source, ordinal: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("{source}-{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunking() -> ChunkingConfig {
        ChunkingConfig::default()
    }

    #[test]
    fn test_qa_rows_become_documents() {
        let csv = "question,answer\nWhat is rent?,Money paid monthly.\nWho signs?,Both parties.\n";
        let batch = normalize(csv.as_bytes(), Source::Qa, &chunking()).unwrap();
        assert_eq!(batch.total_rows, 2);
        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.documents.len(), 2);
        assert_eq!(
            batch.documents[0].text,
            "Question: What is rent?\nAnswer: Money paid monthly."
        );
        assert_eq!(batch.documents[0].metadata["question"], "What is rent?");
    }

    #[test]
    fn test_missing_required_column_is_malformed() {
        let csv = "question,reply\nWhat is rent?,Money.\n";
        let err = normalize(csv.as_bytes(), Source::Qa, &chunking()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));
        assert!(err.to_string().contains("answer"));
    }

    #[test]
    fn test_bad_rows_skipped_and_counted() {
        let csv = "question,answer\n\
                   q1,a1\n\
                   q2,a2\n\
                   q3,\n\
                   q4,a4\n\
                   q5,a5\n\
                   q6,a6\n";
        let batch = normalize(csv.as_bytes(), Source::Qa, &chunking()).unwrap();
        assert_eq!(batch.total_rows, 6);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.documents.len(), 5);
        assert_eq!(batch.documents.len() + batch.skipped, batch.total_rows);
    }

    #[test]
    fn test_empty_tabular_file_is_malformed() {
        let csv = "question,answer\n";
        let err = normalize(csv.as_bytes(), Source::Qa, &chunking()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));
    }

    #[test]
    fn test_property_text_rendering() {
        let csv = "Property Address,Floor,Suite,Size (SF),Rent/SF/Year,Annual Rent,Monthly Rent,Associate 1,BROKER Email ID\n\
                   12 Main St,3,301,2500,45,112500,9375,J. Doe,broker@example.com\n";
        let batch = normalize(csv.as_bytes(), Source::Property, &chunking()).unwrap();
        let text = &batch.documents[0].text;
        assert!(text.starts_with("Property: 12 Main St"));
        assert!(text.contains("Size: 2500 SF"));
        assert!(text.contains("Rent per SF: $45"));
        assert!(text.contains("Broker: broker@example.com"));
    }

    #[test]
    fn test_master_clauses_renders_term_answers() {
        let csv = "Document Name,Parties,Non-Compete,Non-Compete-Answer,Insurance,Insurance-Answer\n\
                   Lease A,Acme;Beta,Yes,No competing store within 5 miles,Yes,Tenant carries liability cover\n";
        let batch = normalize(csv.as_bytes(), Source::MasterClauses, &chunking()).unwrap();
        let text = &batch.documents[0].text;
        assert!(text.starts_with("Document: Lease A"));
        assert!(text.contains("Parties: Acme;Beta"));
        assert!(text.contains("Non-Compete: No competing store within 5 miles"));
        assert!(text.contains("Insurance: Tenant carries liability cover"));
    }

    #[test]
    fn test_lease_text_windows() {
        let text = (0..20)
            .map(|i| format!("Clause {i}: the tenant shall maintain the premises in good order."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let batch = normalize(text.as_bytes(), Source::Lease, &chunking()).unwrap();
        assert!(!batch.documents.is_empty());
        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.documents[0].metadata["chunk_index"], "0");
    }

    #[test]
    fn test_empty_lease_file_is_malformed() {
        let err = normalize(b"", Source::Lease, &chunking()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));
    }

    #[test]
    fn test_document_ids_stable_and_distinct() {
        let csv = "question,answer\nq1,a1\nq2,a2\n";
        let a = normalize(csv.as_bytes(), Source::Qa, &chunking()).unwrap();
        let b = normalize(csv.as_bytes(), Source::Qa, &chunking()).unwrap();
        assert_eq!(a.documents[0].id, b.documents[0].id);
        assert_ne!(a.documents[0].id, a.documents[1].id);
        assert!(a.documents[0].id.starts_with("qa-"));
    }
}

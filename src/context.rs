//! Prompt assembly from retrieved passages.
//!
//! Passages are rendered best-first with a provenance line each, under
//! a character budget. When the budget would be exceeded, whole
//! passages are dropped from the bottom of the ranking. The one
//! exception is the top-ranked passage: if it alone is over budget it
//! is truncated rather than dropped, so the prompt is never empty and
//! never exceeds the budget.

use crate::models::{RetrievalResult, RetrievedPassage};

const HEADER: &str =
    "Use the context below to answer the question. If the context does not \
     contain the answer, say you do not know.";

const NO_CONTEXT: &str =
    "No relevant context was found for this question. Say that you do not \
     have enough information to answer.";

/// Build the completion prompt for `question` from `result`, keeping
/// the total under `max_chars`. Returns the prompt and the passages
/// that made it in, in rendered order.
pub fn assemble(
    question: &str,
    result: &RetrievalResult,
    max_chars: usize,
) -> (String, Vec<RetrievedPassage>) {
    let footer = format!("Question: {question}\nAnswer:");

    if result.is_empty() {
        return (format!("{NO_CONTEXT}\n\n{footer}"), Vec::new());
    }

    let fixed = HEADER.len() + footer.len() + 4; // joining blank lines
    let mut used = 0usize;
    let mut blocks: Vec<String> = Vec::new();
    let mut included: Vec<RetrievedPassage> = Vec::new();

    for (rank, passage) in result.passages.iter().enumerate() {
        let mut block = format!(
            "[{}] source={} doc={} score={:.4}\n{}",
            rank + 1,
            passage.source,
            passage.document_id,
            passage.score,
            passage.text
        );
        if fixed + used + block.len() + 2 > max_chars {
            if !blocks.is_empty() {
                break;
            }
            // The best passage alone is over budget: truncate it so
            // the prompt stays bounded instead of emitting nothing.
            truncate_to_char_boundary(&mut block, max_chars.saturating_sub(fixed + 2));
        }
        used += block.len() + 2;
        blocks.push(block);
        included.push(passage.clone());
    }

    let prompt = format!("{HEADER}\n\n{}\n\n{footer}", blocks.join("\n\n"));
    (prompt, included)
}

fn truncate_to_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

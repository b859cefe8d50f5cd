//! Sliding-window text chunker for free-text lease documents.
//!
//! Splits body text into windows that respect a configurable character
//! limit. Windows grow by whole paragraphs (`\n\n`) so clause boundaries
//! survive as long as possible; consecutive windows share a configurable
//! overlap so no clause is lost at a cut point. A paragraph longer than
//! the window is hard-split at word boundaries.

/// Split `text` into overlapping windows of at most `window_chars`
/// characters. Returns an empty vector for blank input.
pub fn windows(text: &str, window_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > window_chars && !buf.is_empty() {
            let carry = tail_overlap(&buf, overlap_chars).to_string();
            out.push(std::mem::take(&mut buf));
            buf = carry;
        }

        if trimmed.len() > window_chars {
            if !buf.is_empty() {
                out.push(std::mem::take(&mut buf));
            }
            hard_split(trimmed, window_chars, overlap_chars, &mut out);
            if let Some(last) = out.last() {
                buf = tail_overlap(last, overlap_chars).to_string();
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.is_empty() && !is_pure_overlap(&out, &buf) {
        out.push(buf);
    }

    out
}

/// A trailing buffer that is nothing but the overlap carried from the
/// previous window adds no new content.
fn is_pure_overlap(out: &[String], buf: &str) -> bool {
    out.last().map(|last| last.ends_with(buf)).unwrap_or(false)
}

/// Split an oversized paragraph into windows at word boundaries.
fn hard_split(para: &str, window_chars: usize, overlap_chars: usize, out: &mut Vec<String>) {
    let mut start = 0usize;
    while start < para.len() {
        let remaining = &para[start..];
        if remaining.len() <= window_chars {
            out.push(remaining.trim().to_string());
            break;
        }

        let mut end = floor_char_boundary(remaining, window_chars);
        // Prefer to cut at a newline or space inside the window.
        if let Some(pos) = remaining[..end].rfind(['\n', ' ']) {
            if pos > 0 {
                end = pos + 1;
            }
        }
        out.push(remaining[..end].trim().to_string());

        let step = end.saturating_sub(overlap_chars).max(1);
        start += ceil_char_boundary_at(para, start + step) - start;
    }
}

/// The last `overlap` bytes of `s`, aligned forward to a char boundary
/// and then to the next word start.
fn tail_overlap(s: &str, overlap: usize) -> &str {
    if overlap == 0 || s.len() <= overlap {
        return if overlap == 0 { "" } else { s };
    }
    let mut start = s.len() - overlap;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    match s[start..].find(' ') {
        Some(pos) if start + pos + 1 < s.len() => &s[start + pos + 1..],
        _ => &s[start..],
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary_at(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

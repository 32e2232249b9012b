//! Budgeted context assembly.
//!
//! Walks ranked chunks and concatenates their texts until the character
//! budget is spent. A chunk that would overflow the budget is skipped whole,
//! never cut, so every chunk in `used_chunks` is intact. The one exception is
//! when nothing fits at all: the best chunk is then truncated to the budget
//! and the result is flagged `truncated`.

use crate::chunk::PARAGRAPH_SEPARATOR;
use crate::models::{Pathway, RetrievalResult, RetrievalStats, ScoredChunk};

/// Assemble a context of at most `max_context_length` characters.
///
/// Chunks are taken in the order given (the index's ranking). Separators
/// between chunks count toward the budget.
pub fn assemble(scored_chunks: &[ScoredChunk], max_context_length: usize) -> RetrievalResult {
    let sep_len = PARAGRAPH_SEPARATOR.chars().count();
    let mut context = String::new();
    let mut used_len = 0usize;
    let mut used_chunks = Vec::new();

    for sc in scored_chunks {
        let remaining = max_context_length.saturating_sub(used_len);
        if remaining == 0 {
            break;
        }

        let text_len = sc.chunk.char_len();
        let needed = if used_chunks.is_empty() {
            text_len
        } else {
            text_len + sep_len
        };
        if needed > remaining {
            continue;
        }

        if !used_chunks.is_empty() {
            context.push_str(PARAGRAPH_SEPARATOR);
        }
        context.push_str(&sc.chunk.text);
        used_len += needed;
        used_chunks.push(sc.chunk.clone());
    }

    let mut truncated = false;
    if used_chunks.is_empty() {
        if let Some(best) = scored_chunks.first() {
            tracing::debug!(
                chunk_id = best.chunk.id,
                chunk_chars = best.chunk.char_len(),
                budget = max_context_length,
                "best chunk exceeds budget, truncating"
            );
            context = truncate_chars(&best.chunk.text, max_context_length).to_string();
            used_len = context.chars().count();
            used_chunks.push(best.chunk.clone());
            truncated = true;
        }
    }

    RetrievalResult {
        context,
        stats: RetrievalStats {
            candidate_count: scored_chunks.len(),
            used_count: used_chunks.len(),
            context_chars: used_len,
            ..RetrievalStats::default()
        },
        used_chunks,
        pathway: Pathway::Rag,
        truncated,
    }
}

/// Return the prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

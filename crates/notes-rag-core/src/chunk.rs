//! Paragraph-boundary text chunker.
//!
//! Splits study notes into [`Chunk`]s on blank-line boundaries. Paragraphs
//! shorter than `min_chunk_size` characters are merged rather than dropped,
//! so no text is lost and no chunk is empty.
//!
//! # Algorithm
//!
//! 1. Walk the text line by line. A line that is empty or whitespace-only
//!    ends the current paragraph. Each paragraph is trimmed.
//! 2. Accumulate paragraphs into a pending buffer joined by `"\n\n"`.
//! 3. Once the buffer reaches `min_chunk_size` characters, emit it as a chunk.
//!    A short paragraph therefore merges forward into the next one.
//! 4. A short remainder at the end merges backward into the last chunk.
//!    If there is no previous chunk it is emitted as-is.
//!
//! Text without any paragraph break always yields exactly one chunk.
//!
//! # Example
//!
//! ```rust
//! use notes_rag_core::chunk::chunk_text;
//!
//! let notes = "A short paragraph.\n\nThe Calvin cycle fixes carbon dioxide into sugars in the stroma.";
//! let chunks = chunk_text(notes, 50);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, 0);
//! ```

use crate::models::Chunk;

/// Default minimum chunk length in characters.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 50;

/// Separator placed between merged paragraphs.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split text into chunks on paragraph boundaries, merging short paragraphs.
///
/// # Guarantees
///
/// - Chunk ids are contiguous: `0, 1, …, N-1`.
/// - Every chunk has at least `min_chunk_size` characters unless the whole
///   input is shorter than that, in which case a single chunk is returned.
/// - Whitespace-only input yields no chunks.
/// - The output depends only on the arguments.
pub fn chunk_text(text: &str, min_chunk_size: usize) -> Vec<Chunk> {
    let mut units: Vec<String> = Vec::new();
    let mut pending = String::new();

    for para in paragraphs(text) {
        if !pending.is_empty() {
            pending.push_str(PARAGRAPH_SEPARATOR);
        }
        pending.push_str(para);

        if pending.chars().count() >= min_chunk_size {
            units.push(std::mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        match units.last_mut() {
            Some(last) => {
                last.push_str(PARAGRAPH_SEPARATOR);
                last.push_str(&pending);
            }
            None => units.push(pending),
        }
    }

    units
        .into_iter()
        .enumerate()
        .map(|(id, text)| Chunk::new(id, text))
        .collect()
}

/// Lazily iterate over the trimmed, non-empty paragraphs of `text`.
///
/// Paragraphs borrow from the input. Calling this again on the same text
/// yields the same sequence.
pub fn paragraphs(text: &str) -> Paragraphs<'_> {
    Paragraphs { rest: text }
}

/// Iterator returned by [`paragraphs`].
#[derive(Debug, Clone)]
pub struct Paragraphs<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Paragraphs<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let mut start = None;
        let mut end = 0;
        let mut consumed = 0;

        for line in self.rest.split_inclusive('\n') {
            let line_start = consumed;
            consumed += line.len();

            if line.trim().is_empty() {
                if start.is_some() {
                    break;
                }
                continue;
            }

            if start.is_none() {
                start = Some(line_start);
            }
            end = consumed;
        }

        let para = start.map(|s| self.rest[s..end].trim());
        self.rest = &self.rest[consumed..];
        para
    }
}

//! In-memory similarity index over one request's chunks.
//!
//! Brute-force cosine similarity against every stored vector. The corpus is a
//! single set of notes, so a linear scan is all that is needed and the index
//! is dropped with the request.

use std::cmp::Ordering;
use thiserror::Error;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};

/// Failures while building or querying a [`SimilarityIndex`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("no chunks to index")]
    Empty,
    #[error("chunk {0} has no embedding vector")]
    MissingVector(usize),
    #[error("vector dimensionality mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Chunks with vectors of one fixed dimensionality.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    chunks: Vec<Chunk>,
    dims: usize,
}

impl SimilarityIndex {
    /// Build an index. Every chunk must carry a vector, and all vectors must
    /// share the same non-zero length.
    pub fn build(chunks: Vec<Chunk>) -> Result<Self, IndexError> {
        let first = chunks.first().ok_or(IndexError::Empty)?;
        let dims = first
            .vector
            .as_ref()
            .map(|v| v.len())
            .ok_or(IndexError::MissingVector(first.id))?;
        if dims == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: 1,
                got: 0,
            });
        }

        for c in &chunks {
            let len = c
                .vector
                .as_ref()
                .map(|v| v.len())
                .ok_or(IndexError::MissingVector(c.id))?;
            if len != dims {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    got: len,
                });
            }
        }

        Ok(Self { chunks, dims })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Score `query` against every chunk and return the best `k`.
    ///
    /// Results are sorted by score descending; equal scores keep ascending
    /// chunk id order. `k` is clamped to the number of chunks.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                got: query.len(),
            });
        }

        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|c| ScoredChunk {
                score: c
                    .vector
                    .as_deref()
                    .map(|v| cosine_similarity(v, query))
                    .unwrap_or(0.0),
                chunk: c.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k.min(self.chunks.len()));

        Ok(scored)
    }
}

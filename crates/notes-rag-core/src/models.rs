//! Core data models for the retrieval pipeline.
//!
//! These types flow through a single retrieval request: notes are split into
//! [`Chunk`]s, the topic becomes a [`Query`], the index produces
//! [`ScoredChunk`]s, and the assembler returns a [`RetrievalResult`]. None of
//! them outlive the request that created them.

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// A retrievable unit of notes text.
///
/// Created by the chunker from one paragraph (after short paragraphs have
/// been merged). The embedding vector is attached once by
/// [`Chunk::with_vector`] and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// 0-based position in the chunker output.
    pub id: usize,
    pub text: String,
    #[serde(skip)]
    pub vector: Option<Vec<f32>>,
}

impl Chunk {
    pub fn new(id: usize, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            vector: None,
        }
    }

    /// Consume the chunk and return it with its embedding attached.
    pub fn with_vector(self, vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            ..self
        }
    }

    /// Length of the chunk text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// The search intent for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub vector: Option<Vec<f32>>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            vector: None,
        }
    }

    pub fn with_vector(self, vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            ..self
        }
    }
}

/// A chunk paired with its cosine similarity to the query, in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Whether the context came from ranked retrieval or the degraded path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pathway {
    #[serde(rename = "RAG")]
    Rag,
    #[serde(rename = "FALLBACK")]
    Fallback,
}

impl Pathway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pathway::Rag => "RAG",
            Pathway::Fallback => "FALLBACK",
        }
    }
}

impl fmt::Display for Pathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the input guard accepted or rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictReason {
    Ok,
    TooLong,
    InjectionDetected,
}

/// Result of running the input guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub allowed: bool,
    pub reason: VerdictReason,
    /// The signature that matched, for `InjectionDetected` verdicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

impl ValidationVerdict {
    pub fn ok() -> Self {
        Self {
            allowed: true,
            reason: VerdictReason::Ok,
            matched: None,
        }
    }

    pub fn too_long() -> Self {
        Self {
            allowed: false,
            reason: VerdictReason::TooLong,
            matched: None,
        }
    }

    pub fn injection(signature: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: VerdictReason::InjectionDetected,
            matched: Some(signature.into()),
        }
    }
}

/// Wall-clock time spent in each pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageTimings {
    #[serde(rename = "validating_ms", serialize_with = "as_millis")]
    pub validating: Duration,
    #[serde(rename = "chunking_ms", serialize_with = "as_millis")]
    pub chunking: Duration,
    #[serde(rename = "embedding_ms", serialize_with = "as_millis")]
    pub embedding: Duration,
    #[serde(rename = "scoring_ms", serialize_with = "as_millis")]
    pub scoring: Duration,
    #[serde(rename = "assembling_ms", serialize_with = "as_millis")]
    pub assembling: Duration,
}

/// Per-request metadata for the caller's telemetry record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalStats {
    /// Chunks produced by the chunker.
    pub chunk_count: usize,
    /// Ranked candidates handed to the assembler.
    pub candidate_count: usize,
    /// Chunks that made it into the context.
    pub used_count: usize,
    /// Length of the assembled context in characters.
    pub context_chars: usize,
    /// Embedding calls issued, including the retry.
    pub embedding_attempts: u32,
    pub timings: StageTimings,
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
}

/// The context handed to the prompt builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub context: String,
    pub used_chunks: Vec<Chunk>,
    pub pathway: Pathway,
    /// Set when the best chunk alone exceeded the budget and was cut.
    pub truncated: bool,
    pub stats: RetrievalStats,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

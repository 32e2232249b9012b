//! Retrieval pipeline orchestration.
//!
//! Runs one request through the linear stage sequence
//!
//! ```text
//! Validating → Chunking → Embedding → Scoring → Assembling → Done
//!      │           │          │          │
//!      ▼           ▼          └────┬─────┘
//!   Failed      Failed          Fallback
//! ```
//!
//! Guard rejections and empty notes are terminal and returned as
//! [`RetrievalError`]s. Embedding or index failures are absorbed: the
//! pipeline returns the first `max_context_length` characters of the raw
//! notes tagged [`Pathway::Fallback`] instead of failing the request.
//!
//! The pipeline holds only immutable configuration and a shared embedder, so
//! one instance can serve concurrent requests. Dropping the future returned
//! by [`RetrievalPipeline::retrieve`] abandons any in-flight embedding call.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::assemble::{assemble, truncate_chars};
use crate::chunk::{chunk_text, DEFAULT_MIN_CHUNK_SIZE};
use crate::embedding::{EmbedPolicy, Embedder, EmbeddingError};
use crate::guard::{InputGuard, DEFAULT_INJECTION_SIGNATURES, DEFAULT_MAX_INPUT_LENGTH};
use crate::index::{IndexError, SimilarityIndex};
use crate::models::{
    Chunk, Pathway, Query, RetrievalResult, RetrievalStats, ScoredChunk, StageTimings,
    ValidationVerdict, VerdictReason,
};

/// Query used when the caller supplies no topic.
pub const DEFAULT_QUERY: &str = "generate quiz questions from notes";

/// Knobs for one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Maximum notes length in characters.
    pub max_input_length: usize,
    /// Case-insensitive phrases that reject a request.
    pub injection_signatures: Vec<String>,
    /// Paragraphs shorter than this are merged with a neighbour.
    pub min_chunk_size: usize,
    /// Maximum chunks considered for the context.
    pub top_k: usize,
    /// Hard cap on the assembled context, in characters.
    pub max_context_length: usize,
    pub default_query: String,
    pub embed_timeout: Duration,
    pub embed_retries: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            injection_signatures: DEFAULT_INJECTION_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            top_k: 3,
            max_context_length: 2000,
            default_query: DEFAULT_QUERY.to_string(),
            embed_timeout: Duration::from_secs(5),
            embed_retries: 1,
        }
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validating,
    Chunking,
    Embedding,
    Scoring,
    Assembling,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Validating => "validating",
            PipelineStage::Chunking => "chunking",
            PipelineStage::Embedding => "embedding",
            PipelineStage::Scoring => "scoring",
            PipelineStage::Assembling => "assembling",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Request-level failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetrievalError {
    #[error("notes too long: {len} characters (maximum {max})")]
    InputTooLong { len: usize, max: usize },
    #[error("invalid input detected (matched \"{signature}\"), please rephrase your request")]
    InjectionDetected { signature: String },
    /// Absorbed by the pipeline into a fallback result; never returned
    /// from [`RetrievalPipeline::retrieve`].
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
}

impl RetrievalError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RetrievalError::InputTooLong { .. } => "input_too_long",
            RetrievalError::InjectionDetected { .. } => "injection_detected",
            RetrievalError::EmbeddingUnavailable(_) => "embedding_unavailable",
            RetrievalError::DegenerateInput(_) => "degenerate_input",
        }
    }

    /// The stage that produced this error.
    pub fn stage(&self) -> PipelineStage {
        match self {
            RetrievalError::InputTooLong { .. } | RetrievalError::InjectionDetected { .. } => {
                PipelineStage::Validating
            }
            RetrievalError::DegenerateInput(_) => PipelineStage::Chunking,
            RetrievalError::EmbeddingUnavailable(_) => PipelineStage::Embedding,
        }
    }

    /// The guard verdict behind a rejection, if this is one.
    pub fn verdict(&self) -> Option<ValidationVerdict> {
        match self {
            RetrievalError::InputTooLong { .. } => Some(ValidationVerdict::too_long()),
            RetrievalError::InjectionDetected { signature } => {
                Some(ValidationVerdict::injection(signature.clone()))
            }
            _ => None,
        }
    }

    /// Whether the request must be rejected rather than degraded.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetrievalError::EmbeddingUnavailable(_))
    }
}

impl From<EmbeddingError> for RetrievalError {
    fn from(e: EmbeddingError) -> Self {
        RetrievalError::EmbeddingUnavailable(e.to_string())
    }
}

impl From<IndexError> for RetrievalError {
    fn from(e: IndexError) -> Self {
        RetrievalError::EmbeddingUnavailable(e.to_string())
    }
}

/// Guard → chunk → embed → score → assemble, with graceful degradation.
pub struct RetrievalPipeline {
    config: RetrievalConfig,
    guard: InputGuard,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalPipeline {
    /// `top_k` and `max_context_length` are clamped to at least 1.
    pub fn new(mut config: RetrievalConfig, embedder: Arc<dyn Embedder>) -> Self {
        if config.top_k == 0 || config.max_context_length == 0 {
            tracing::warn!(
                top_k = config.top_k,
                max_context_length = config.max_context_length,
                "zero retrieval limits clamped to 1"
            );
            config.top_k = config.top_k.max(1);
            config.max_context_length = config.max_context_length.max(1);
        }
        let guard = InputGuard::new(config.max_input_length, &config.injection_signatures);
        Self {
            config,
            guard,
            embedder,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Run only the input guard.
    pub fn validate(&self, notes: &str, topic: &str) -> ValidationVerdict {
        self.guard.validate_request(notes, topic)
    }

    /// Retrieve a bounded context from `notes` for `topic`.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::InputTooLong`] / [`RetrievalError::InjectionDetected`]
    ///   when the guard rejects the request. Nothing else runs.
    /// - [`RetrievalError::DegenerateInput`] when the notes contain no text.
    ///
    /// Embedding and index failures do not produce errors; they yield a
    /// [`Pathway::Fallback`] result.
    pub async fn retrieve(
        &self,
        notes: &str,
        topic: &str,
    ) -> Result<RetrievalResult, RetrievalError> {
        let started = Instant::now();
        let mut timings = StageTimings::default();

        tracing::debug!(stage = %PipelineStage::Validating, notes_chars = notes.len());
        let t = Instant::now();
        let verdict = self.validate(notes, topic);
        timings.validating = t.elapsed();
        match verdict.reason {
            VerdictReason::Ok => {}
            VerdictReason::TooLong => {
                let err = RetrievalError::InputTooLong {
                    len: notes.chars().count(),
                    max: self.config.max_input_length,
                };
                return Err(self.fail(err));
            }
            VerdictReason::InjectionDetected => {
                let err = RetrievalError::InjectionDetected {
                    signature: verdict.matched.unwrap_or_default(),
                };
                return Err(self.fail(err));
            }
        }

        tracing::debug!(stage = %PipelineStage::Chunking);
        let t = Instant::now();
        let chunks = chunk_text(notes, self.config.min_chunk_size);
        timings.chunking = t.elapsed();
        if chunks.is_empty() {
            return Err(self.fail(RetrievalError::DegenerateInput(
                "notes contain no text after chunking".to_string(),
            )));
        }
        let chunk_count = chunks.len();

        let query = Query::new(match topic.trim() {
            "" => self.config.default_query.as_str(),
            t => t,
        });

        let mut attempts = 0u32;
        let ranked = self
            .rank(chunks, query, &mut timings, &mut attempts)
            .await;

        let mut result = match ranked {
            Ok(scored) => {
                tracing::debug!(stage = %PipelineStage::Assembling, candidates = scored.len());
                let t = Instant::now();
                let result = assemble(&scored, self.config.max_context_length);
                timings.assembling = t.elapsed();
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval degraded to fallback pathway");
                self.fallback(notes)
            }
        };

        result.stats.chunk_count = chunk_count;
        result.stats.embedding_attempts = attempts;
        result.stats.timings = timings;
        result.stats.latency = started.elapsed();

        tracing::debug!(
            stage = %PipelineStage::Done,
            pathway = %result.pathway,
            used = result.stats.used_count,
            context_chars = result.stats.context_chars,
        );
        Ok(result)
    }

    /// Embed chunks and query in one batch, index them, and search.
    async fn rank(
        &self,
        chunks: Vec<Chunk>,
        query: Query,
        timings: &mut StageTimings,
        attempts: &mut u32,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        tracing::debug!(stage = %PipelineStage::Embedding, texts = chunks.len() + 1);
        let t = Instant::now();
        let mut texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        texts.push(query.text.clone());

        let policy = EmbedPolicy {
            timeout: self.config.embed_timeout,
            retries: self.config.embed_retries,
        };
        let embedded = policy.embed(self.embedder.as_ref(), &texts, attempts).await;
        timings.embedding = t.elapsed();
        let mut vectors = embedded?;

        let query = match vectors.pop() {
            Some(v) => query.with_vector(v),
            None => {
                return Err(RetrievalError::EmbeddingUnavailable(
                    "missing query vector".to_string(),
                ))
            }
        };
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(c, v)| c.with_vector(v))
            .collect();

        tracing::debug!(stage = %PipelineStage::Scoring, chunks = chunks.len());
        let t = Instant::now();
        let index = SimilarityIndex::build(chunks)?;
        let query_vec = query.vector.as_deref().unwrap_or_default();
        let scored = index.search(query_vec, self.config.top_k)?;
        timings.scoring = t.elapsed();

        Ok(scored)
    }

    fn fallback(&self, notes: &str) -> RetrievalResult {
        let context = truncate_chars(notes, self.config.max_context_length).to_string();
        RetrievalResult {
            stats: RetrievalStats {
                context_chars: context.chars().count(),
                ..RetrievalStats::default()
            },
            context,
            used_chunks: Vec::new(),
            pathway: Pathway::Fallback,
            truncated: false,
        }
    }

    fn fail(&self, err: RetrievalError) -> RetrievalError {
        tracing::debug!(stage = %PipelineStage::Failed, from = %err.stage(), code = err.code());
        err
    }
}

/// One-shot retrieval with an explicit configuration.
pub async fn retrieve(
    notes: &str,
    topic: &str,
    config: &RetrievalConfig,
    embedder: Arc<dyn Embedder>,
) -> Result<RetrievalResult, RetrievalError> {
    RetrievalPipeline::new(config.clone(), embedder)
        .retrieve(notes, topic)
        .await
}

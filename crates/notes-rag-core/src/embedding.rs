//! Embedding trait, call policy, and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! the [`EmbedPolicy`] that bounds each call with a timeout and a single
//! retry, and the pure [`cosine_similarity`] helper used by the index.
//!
//! [`HashEmbedder`] is a deterministic, dependency-free backend used for
//! offline runs and tests. Network and on-device backends (Ollama, OpenAI,
//! fastembed) live in the `notes-rag` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

/// Failures from an embedding backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbeddingError {
    /// The backend could not be reached or returned an error.
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),
    /// The call did not complete within the configured timeout.
    #[error("embedding call timed out after {0:?}")]
    Timeout(Duration),
    /// The backend answered, but with the wrong shape.
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

impl EmbeddingError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbeddingError::Unavailable(_) | EmbeddingError::Timeout(_))
    }
}

/// A text → vector backend.
///
/// Implementations must be deterministic (the same text yields the same
/// vector) and return vectors of exactly [`dims`](Embedder::dims) elements.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per text in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut out = self.embed(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| EmbeddingError::Malformed("empty embedding response".to_string()))
    }
}

/// Timeout and retry bounds applied to every embedding call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedPolicy {
    pub timeout: Duration,
    /// Extra attempts after the first one fails transiently.
    pub retries: u32,
}

impl Default for EmbedPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 1,
        }
    }
}

impl EmbedPolicy {
    /// Embed `texts` under this policy and check the response shape.
    ///
    /// `attempts` is incremented once per call issued to the backend.
    /// Malformed responses are not retried.
    pub async fn embed(
        &self,
        embedder: &dyn Embedder,
        texts: &[String],
        attempts: &mut u32,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut last_err = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tracing::debug!(attempt, "retrying embedding call");
            }
            *attempts += 1;

            let outcome = match tokio::time::timeout(self.timeout, embedder.embed(texts)).await {
                Ok(res) => res,
                Err(_) => Err(EmbeddingError::Timeout(self.timeout)),
            };

            match outcome.and_then(|vecs| check_shape(embedder.dims(), texts.len(), vecs)) {
                Ok(vecs) => return Ok(vecs),
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, attempt, "embedding call failed");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            EmbeddingError::Unavailable("embedding failed after retries".to_string())
        }))
    }
}

fn check_shape(
    dims: usize,
    expected: usize,
    vecs: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vecs.len() != expected {
        return Err(EmbeddingError::Malformed(format!(
            "expected {} vectors, got {}",
            expected,
            vecs.len()
        )));
    }
    let width = if dims > 0 {
        dims
    } else {
        vecs.first().map(|v| v.len()).unwrap_or(0)
    };
    if let Some(bad) = vecs.iter().find(|v| v.len() != width || v.is_empty()) {
        return Err(EmbeddingError::Malformed(format!(
            "expected {} dimensions, got {}",
            width,
            bad.len()
        )));
    }
    Ok(vecs)
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors,
/// vectors of different lengths, zero vectors, and non-finite results.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
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

    let sim = dot / denom;
    if sim.is_finite() {
        sim.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed with SHA-256 into one of
/// `dims` buckets with a ±1 sign; the result is L2-normalized. Texts with
/// no tokens embed to the zero vector. No model, no network.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults of the
//! retrieval core. [`load_config`] parses and validates a file, and
//! [`Config::retrieval_config`] converts the result into the explicit
//! [`RetrievalConfig`] value the pipeline is constructed with.
//!
//! ```toml
//! [guard]
//! max_input_length = 10000
//!
//! [chunking]
//! min_chunk_size = 50
//!
//! [retrieval]
//! top_k = 3
//! max_context_length = 2000
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//! ```

use anyhow::{Context, Result};
use notes_rag_core::chunk::DEFAULT_MIN_CHUNK_SIZE;
use notes_rag_core::guard::{DEFAULT_INJECTION_SIGNATURES, DEFAULT_MAX_INPUT_LENGTH};
use notes_rag_core::pipeline::{RetrievalConfig, DEFAULT_QUERY};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardConfig {
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    #[serde(default = "default_injection_signatures")]
    pub injection_signatures: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_input_length: default_max_input_length(),
            injection_signatures: default_injection_signatures(),
        }
    }
}

fn default_max_input_length() -> usize {
    DEFAULT_MAX_INPUT_LENGTH
}
fn default_injection_signatures() -> Vec<String> {
    DEFAULT_INJECTION_SIGNATURES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

fn default_min_chunk_size() -> usize {
    DEFAULT_MIN_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalSection {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
    #[serde(default = "default_query")]
    pub default_query: String,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_length: default_max_context_length(),
            default_query: default_query(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_max_context_length() -> usize {
    2000
}
fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama` and `openai` providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    1
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,
    #[serde(default = "default_telemetry_path")]
    pub path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            path: default_telemetry_path(),
        }
    }
}

fn default_telemetry_enabled() -> bool {
    true
}
fn default_telemetry_path() -> PathBuf {
    PathBuf::from("./logs/telemetry.jsonl")
}

impl Config {
    /// Build the explicit configuration value the retrieval pipeline takes.
    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            max_input_length: self.guard.max_input_length,
            injection_signatures: self.guard.injection_signatures.clone(),
            min_chunk_size: self.chunking.min_chunk_size,
            top_k: self.retrieval.top_k,
            max_context_length: self.retrieval.max_context_length,
            default_query: self.retrieval.default_query.clone(),
            embed_timeout: self.embedding.timeout(),
            embed_retries: self.embedding.max_retries,
        }
    }
}

/// Read, parse, and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate_config(&config)?;
    Ok(config)
}

/// Check value ranges and provider requirements.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.guard.max_input_length == 0 {
        anyhow::bail!("guard.max_input_length must be > 0");
    }

    if config.chunking.min_chunk_size == 0 {
        anyhow::bail!("chunking.min_chunk_size must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_context_length == 0 {
        anyhow::bail!("retrieval.max_context_length must be > 0");
    }
    if config.retrieval.default_query.trim().is_empty() {
        anyhow::bail!("retrieval.default_query must not be empty");
    }

    if config.embedding.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs must be > 0");
    }
    if config.embedding.max_retries > 1 {
        anyhow::bail!(
            "embedding.max_retries must be 0 or 1 (got {}); failures degrade to the fallback pathway instead",
            config.embedding.max_retries
        );
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "ollama" | "openai" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, ollama, openai, or local.",
            other
        ),
    }

    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    Ok(())
}

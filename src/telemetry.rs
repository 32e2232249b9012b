//! Per-request telemetry log.
//!
//! One JSON object per line. The retrieval core only returns metadata; this
//! module turns it into a persisted record and aggregates the file back into
//! summary statistics for `notes-rag stats`.

use anyhow::{Context, Result};
use chrono::Utc;
use notes_rag_core::models::{Pathway, RetrievalResult};
use notes_rag_core::pipeline::RetrievalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome label stored in each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Rejected,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Rejected => "rejected",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the telemetry log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    pub pathway: String,
    pub status: Status,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_retrieved: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TelemetryRecord {
    /// Record for a completed retrieval.
    pub fn from_result(result: &RetrievalResult) -> Self {
        Self {
            timestamp: now_rfc3339(),
            pathway: result.pathway.to_string(),
            status: Status::Success,
            latency_ms: result.stats.latency.as_millis() as u64,
            chunk_count: Some(result.stats.chunk_count),
            chunks_retrieved: Some(result.used_chunks.len()),
            context_chars: Some(result.stats.context_chars),
            truncated: Some(result.truncated),
            error: None,
        }
    }

    /// Record for a request that ended in an error.
    pub fn from_error(err: &RetrievalError, latency: Duration) -> Self {
        let status = if err.verdict().is_some() {
            Status::Rejected
        } else {
            Status::Error
        };
        Self {
            timestamp: now_rfc3339(),
            pathway: Pathway::Rag.to_string(),
            status,
            latency_ms: latency.as_millis() as u64,
            chunk_count: None,
            chunks_retrieved: None,
            context_chars: None,
            truncated: None,
            error: Some(err.to_string()),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Aggregates over the whole log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryStats {
    pub total_requests: usize,
    /// Percentage of records with `status = success`.
    pub success_rate: f64,
    pub avg_latency_ms: u64,
    pub fallback_count: usize,
    pub rejected_count: usize,
    pub avg_chunks_retrieved: f64,
}

/// Append-only JSONL telemetry file.
///
/// Clones share one write lock, so concurrent appends from the same process
/// never interleave within a line.
#[derive(Debug, Clone)]
pub struct TelemetryLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl TelemetryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the parent directory if needed.
    pub fn append(&self, record: &TelemetryRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create telemetry directory: {}", parent.display())
                })?;
            }
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("telemetry write lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open telemetry log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// [`append`](Self::append) on the blocking thread pool.
    pub async fn append_blocking(&self, record: TelemetryRecord) -> Result<()> {
        let log = self.clone();
        tokio::task::spawn_blocking(move || log.append(&record))
            .await
            .context("telemetry append task failed")?
    }

    /// Read every parseable record. Malformed lines are skipped; a missing
    /// file reads as empty.
    pub fn records(&self) -> Result<Vec<TelemetryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)
            .with_context(|| format!("Failed to open telemetry log: {}", self.path.display()))?;

        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryRecord>(&line) {
                Ok(r) => out.push(r),
                Err(e) => tracing::debug!(error = %e, "skipping malformed telemetry line"),
            }
        }
        Ok(out)
    }

    /// The last `n` records, oldest first.
    pub fn tail(&self, n: usize) -> Result<Vec<TelemetryRecord>> {
        let mut records = self.records()?;
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }

    pub fn stats(&self) -> Result<TelemetryStats> {
        Ok(summarize(&self.records()?))
    }
}

/// Aggregate a set of records.
pub fn summarize(records: &[TelemetryRecord]) -> TelemetryStats {
    if records.is_empty() {
        return TelemetryStats::default();
    }

    let total = records.len();
    let successes = records
        .iter()
        .filter(|r| r.status == Status::Success)
        .count();
    let latency_sum: u64 = records.iter().map(|r| r.latency_ms).sum();
    let retrieved: Vec<usize> = records.iter().filter_map(|r| r.chunks_retrieved).collect();

    TelemetryStats {
        total_requests: total,
        success_rate: successes as f64 / total as f64 * 100.0,
        avg_latency_ms: latency_sum / total as u64,
        fallback_count: records
            .iter()
            .filter(|r| r.pathway == Pathway::Fallback.as_str())
            .count(),
        rejected_count: records
            .iter()
            .filter(|r| r.status == Status::Rejected)
            .count(),
        avg_chunks_retrieved: if retrieved.is_empty() {
            0.0
        } else {
            retrieved.iter().sum::<usize>() as f64 / retrieved.len() as f64
        },
    }
}

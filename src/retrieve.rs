//! CLI retrieval commands.
//!
//! `notes-rag retrieve`, `check`, and `chunks` all take `--notes`, which is
//! either a path to a notes file, `-` for stdin, or the notes text itself.

use anyhow::{bail, Context, Result};
use notes_rag_core::chunk::chunk_text;
use notes_rag_core::guard::InputGuard;
use notes_rag_core::models::{RetrievalResult, VerdictReason};
use notes_rag_core::pipeline::RetrievalPipeline;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::telemetry::{TelemetryLog, TelemetryRecord};

/// Resolve a `--notes` argument to the notes text.
pub fn read_notes(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read notes from stdin")?;
        return Ok(buf);
    }

    let path = Path::new(arg);
    if !arg.contains('\n') && path.is_file() {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read notes file: {}", path.display()));
    }
    Ok(arg.to_string())
}

/// Run the full pipeline and print the context (or the JSON result).
///
/// Guard rejections and degenerate input are returned as errors so the
/// process exits non-zero.
pub async fn run_retrieve(config: &Config, notes: &str, topic: &str, json: bool) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let pipeline = RetrievalPipeline::new(config.retrieval_config(), embedder);
    let telemetry = config
        .telemetry
        .enabled
        .then(|| TelemetryLog::new(&config.telemetry.path));

    let started = Instant::now();
    let outcome = pipeline.retrieve(notes, topic).await;

    if let Some(log) = &telemetry {
        let record = match &outcome {
            Ok(result) => TelemetryRecord::from_result(result),
            Err(err) => TelemetryRecord::from_error(err, started.elapsed()),
        };
        if let Err(e) = log.append(&record) {
            tracing::warn!(error = %e, "failed to write telemetry record");
        }
    }

    let result = match outcome {
        Ok(result) => result,
        Err(err) => bail!("{} ({})", err, err.code()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &RetrievalResult) {
    eprintln!(
        "pathway: {}  chunks: {}/{}  context: {} chars{}",
        result.pathway,
        result.used_chunks.len(),
        result.stats.chunk_count,
        result.stats.context_chars,
        if result.truncated { "  (truncated)" } else { "" }
    );
    println!("{}", result.context);
}

/// Run only the input guard and print its verdict.
pub fn run_check(config: &Config, notes: &str, topic: &str) -> Result<()> {
    let guard = InputGuard::new(
        config.guard.max_input_length,
        &config.guard.injection_signatures,
    );
    let verdict = guard.validate_request(notes, topic);

    match verdict.reason {
        VerdictReason::Ok => println!("ok: {} characters", notes.chars().count()),
        VerdictReason::TooLong => bail!(
            "rejected: notes are {} characters (maximum {})",
            notes.chars().count(),
            config.guard.max_input_length
        ),
        VerdictReason::InjectionDetected => bail!(
            "rejected: injection signature \"{}\"",
            verdict.matched.unwrap_or_default()
        ),
    }
    Ok(())
}

/// Print the chunker's output.
pub fn run_chunks(config: &Config, notes: &str) -> Result<()> {
    let chunks = chunk_text(notes, config.chunking.min_chunk_size);
    if chunks.is_empty() {
        println!("No chunks.");
        return Ok(());
    }

    for chunk in &chunks {
        println!("--- chunk {} ({} chars) ---", chunk.id, chunk.char_len());
        println!("{}", chunk.text);
    }
    println!();
    println!("{} chunks (min_chunk_size = {})", chunks.len(), config.chunking.min_chunk_size);
    Ok(())
}

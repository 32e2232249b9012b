//! Telemetry overview.
//!
//! Summarizes the telemetry log: request count, success rate, latency, and
//! how often retrieval degraded to the fallback pathway. Used by
//! `notes-rag stats`.

use anyhow::Result;

use crate::config::Config;
use crate::telemetry::{TelemetryLog, TelemetryRecord};

/// Run the stats command: read the telemetry log and print a summary,
/// followed by the last `tail` records when requested.
pub fn run_stats(config: &Config, tail: Option<usize>) -> Result<()> {
    let log = TelemetryLog::new(&config.telemetry.path);
    let stats = log.stats()?;

    println!("notes-rag — Telemetry Stats");
    println!("===========================");
    println!();
    println!("  Log:          {}", log.path().display());
    println!();

    if stats.total_requests == 0 {
        println!("  No requests recorded yet.");
        return Ok(());
    }

    println!("  Requests:     {}", stats.total_requests);
    println!("  Success rate: {:.1}%", stats.success_rate);
    println!("  Avg latency:  {} ms", stats.avg_latency_ms);
    println!(
        "  Fallbacks:    {} ({:.1}%)",
        stats.fallback_count,
        stats.fallback_count as f64 * 100.0 / stats.total_requests as f64
    );
    println!("  Rejected:     {}", stats.rejected_count);
    println!("  Avg chunks:   {:.1}", stats.avg_chunks_retrieved);

    if let Some(n) = tail {
        println!();
        println!("  Last {} requests:", n);
        for record in log.tail(n)? {
            println!("    {}", format_record(&record));
        }
    }

    Ok(())
}

fn format_record(r: &TelemetryRecord) -> String {
    let mut line = format!(
        "{}  {:<8}  {:<8}  {:>5} ms",
        r.timestamp,
        r.status.as_str(),
        r.pathway,
        r.latency_ms
    );
    if let Some(n) = r.chunks_retrieved {
        line.push_str(&format!("  chunks={}", n));
    }
    if let Some(e) = &r.error {
        line.push_str(&format!("  error={}", e));
    }
    line
}

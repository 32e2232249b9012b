//! # notes-rag
//!
//! The retrieval front half of a notes-to-quiz generator.
//!
//! Raw study notes go in; a bounded, relevance-ranked context comes out,
//! ready to be spliced into a quiz-generation prompt. The pure pipeline lives
//! in the `notes-rag-core` crate; this crate wires it to configuration,
//! embedding backends, a telemetry log, a CLI, and an HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  Guard   │──▶│ Chunker  │──▶│ Embedder │──▶│  Index   │──▶│ Assemble │
//! │ len+inj. │   │ ¶ merge  │   │  batch   │   │  top-K   │   │  budget  │
//! └──────────┘   └──────────┘   └────┬─────┘   └──────────┘   └──────────┘
//!                                    │ unavailable
//!                                    ▼
//!                               ┌──────────┐
//!                               │ Fallback │  first N chars of the notes
//!                               └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! notes-rag check --notes notes.txt
//! notes-rag chunks --notes notes.txt
//! notes-rag retrieve --notes notes.txt --topic "cell biology"
//! notes-rag serve
//! notes-rag stats --tail 10
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding backends |
//! | [`retrieve`] | CLI retrieval commands |
//! | [`server`] | HTTP server |
//! | [`stats`] | Telemetry summary command |
//! | [`telemetry`] | JSONL request log |

pub mod config;
pub mod embedding;
pub mod retrieve;
pub mod server;
pub mod stats;
pub mod telemetry;

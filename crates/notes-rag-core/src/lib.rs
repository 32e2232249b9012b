//! # notes-rag core
//!
//! The retrieval half of a notes-to-quiz system: it decides whether a
//! request may proceed, splits the notes into chunks, embeds them, ranks
//! them against the topic, and assembles a bounded context for the
//! downstream prompt.
//!
//! This crate holds no network clients, files, or global state. Embedding
//! backends plug in through [`embedding::Embedder`]; configuration is passed
//! explicitly as a [`pipeline::RetrievalConfig`].
//!
//! ```rust
//! use std::sync::Arc;
//! use notes_rag_core::embedding::HashEmbedder;
//! use notes_rag_core::models::Pathway;
//! use notes_rag_core::pipeline::{RetrievalConfig, RetrievalPipeline};
//!
//! # tokio_test_block(async {
//! let pipeline = RetrievalPipeline::new(RetrievalConfig::default(), Arc::new(HashEmbedder::new(64)));
//! let notes = "Chloroplasts capture light energy and convert it into chemical energy.";
//! let result = pipeline.retrieve(notes, "chloroplasts").await.unwrap();
//! assert_eq!(result.pathway, Pathway::Rag);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod assemble;
pub mod chunk;
pub mod embedding;
pub mod guard;
pub mod index;
pub mod models;
pub mod pipeline;

pub use embedding::{Embedder, EmbeddingError};
pub use models::{Chunk, Pathway, RetrievalResult, ValidationVerdict};
pub use pipeline::{retrieve, RetrievalConfig, RetrievalError, RetrievalPipeline};

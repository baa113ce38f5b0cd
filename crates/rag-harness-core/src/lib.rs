//! # RAG Harness Core
//!
//! Transport-free logic for RAG Harness: data models, chunking, confidence
//! scoring, the web-search gate, prompt composition, the collaborator
//! traits, and the retrieval-fusion [`pipeline`].
//!
//! This crate contains no HTTP client, database driver, filesystem I/O, or
//! async runtime. Concrete collaborators (SQLite store, OpenAI-compatible
//! generator, Tavily search, network embedders) live in the `rag-harness`
//! app crate and are handed to [`pipeline::RagPipeline`] as trait objects.

pub mod chunk;
pub mod compose;
pub mod confidence;
pub mod embedding;
pub mod error;
pub mod gate;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod web_search;

pub use error::RagError;
pub use pipeline::{PipelineSettings, QueryRequest, RagPipeline};

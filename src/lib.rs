//! # RAG Harness
//!
//! A retrieval-augmented product support service. Documents (PDF, text,
//! Markdown) are chunked, embedded and stored in SQLite; questions are
//! answered from the closest chunks, and a web search supplements the
//! answer when the knowledge base looks unsure.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  PDF / txt  │──▶│ Chunk+Embed  │──▶│  SQLite  │
//! │   uploads   │   │   (ingest)   │   │ vectors  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │ retrieve
//!                   ┌──────────┐      ┌─────▼──────┐      ┌─────┐
//!                   │  Tavily  │◀─────│    gate    │─────▶│ LLM │
//!                   └──────────┘      └────────────┘      └─────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                          # create database
//! rag ingest ./docs                 # index a directory
//! rag query "How do I reset my password?"
//! rag serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completions generator and SSE decoding |
//! | [`web_search`] | Tavily web search |
//! | [`extract`] | PDF and text extraction |
//! | [`ingest`] | Knowledge-base ingestion |
//! | [`app`] | Collaborator wiring |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI subcommands |
//!
//! The retrieval-fusion logic itself (chunking, confidence, gating, context
//! composition, the pipeline) lives in the `rag-harness-core` crate.

pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
pub mod web_search;
